//! Quantized prediction through an inference engine.
//!
//! One call: allocate, read descriptors, quantize the float input, bind it,
//! invoke, read the first batch element of the output, dequantize.

use crate::engine::{InferenceEngine, TensorDetails};
use crate::error::QuantError;
use crate::quantize::CastPolicy;
use crate::tensor::TensorData;
use crate::Result;
use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Configuration for the quantized predictor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Position in `input_details()` of the tensor to feed
    pub input_slot: usize,

    /// Position in `output_details()` of the tensor to read
    pub output_slot: usize,

    /// Float-to-integer narrowing policy for the input
    pub cast: CastPolicy,
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Example
    /// ```
    /// use quant_inference::predictor::Config;
    /// use quant_inference::quantize::Rounding;
    ///
    /// let config = Config::from_json_str(r#"{"cast": {"rounding": "nearest"}}"#).unwrap();
    /// assert_eq!(config.cast.rounding, Rounding::Nearest);
    /// assert_eq!(config.input_slot, 0);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Run one quantized forward pass with the default configuration.
///
/// Engine faults are returned unchanged.
///
/// # Arguments
/// * `engine` - Engine with a model already loaded
/// * `input` - Float input shaped as the model expects
pub fn predict<E>(engine: &mut E, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>>
where
    E: InferenceEngine + ?Sized,
{
    predict_with(engine, input, &Config::default())
}

/// Run one quantized forward pass.
///
/// Both descriptors are validated before anything is bound, so a zero or
/// non-finite scale never reaches the engine.
pub fn predict_with<E>(
    engine: &mut E,
    input: ArrayViewD<'_, f32>,
    config: &Config,
) -> Result<ArrayD<f32>>
where
    E: InferenceEngine + ?Sized,
{
    engine.allocate_tensors()?;

    let input_details = select(engine.input_details()?, config.input_slot, "input")?;
    let output_details = select(engine.output_details()?, config.output_slot, "output")?;
    output_details
        .quantization
        .validate_for(output_details.dtype)?;

    debug!(
        input = %input_details.name,
        input_dtype = %input_details.dtype,
        input_scale = input_details.quantization.scale,
        input_zero_point = input_details.quantization.zero_point,
        output = %output_details.name,
        output_dtype = %output_details.dtype,
        output_scale = output_details.quantization.scale,
        output_zero_point = output_details.quantization.zero_point,
        shape = ?input.shape(),
        "Running quantized prediction"
    );

    let quantized = TensorData::quantize(
        &input,
        input_details.dtype,
        input_details.quantization,
        config.cast,
    )?;

    trace!(index = input_details.index, "Binding input tensor");
    engine.set_tensor(input_details.index, quantized)?;

    trace!("Invoking engine");
    engine.invoke()?;

    let raw = engine.get_tensor(output_details.index)?;
    if raw.dtype() != output_details.dtype {
        return Err(QuantError::DTypeMismatch {
            name: output_details.name,
            expected: output_details.dtype,
            actual: raw.dtype(),
        }
        .into());
    }

    let first = raw.first_batch(&output_details.name)?;
    let output = first.dequantize(output_details.quantization);

    debug!(shape = ?output.shape(), "Prediction complete");

    Ok(output)
}

fn select(
    mut details: Vec<TensorDetails>,
    slot: usize,
    kind: &'static str,
) -> std::result::Result<TensorDetails, QuantError> {
    let available = details.len();
    if slot >= available {
        return Err(QuantError::MissingTensor {
            kind,
            slot,
            available,
        });
    }
    Ok(details.swap_remove(slot))
}

/// An engine paired with its prediction configuration.
///
/// Holding the engine by value makes each `predict` call exclusive.
pub struct QuantizedPredictor<E: InferenceEngine> {
    /// Underlying engine
    engine: E,

    /// Configuration
    config: Config,
}

impl<E: InferenceEngine> QuantizedPredictor<E> {
    /// Wrap an engine that already has a model loaded.
    pub fn new(engine: E, config: Config) -> Self {
        Self { engine, config }
    }

    /// Run one quantized forward pass.
    pub fn predict(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        predict_with(&mut self.engine, input, &self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Give back the engine.
    pub fn into_inner(self) -> E {
        self.engine
    }
}
