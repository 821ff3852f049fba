//! ONNX Runtime backed engine.
//!
//! ONNX models do not publish TFLite-style quantization on their graph
//! inputs and outputs, so the descriptors come from [`OrtEngineConfig`]
//! (typically a JSON sidecar next to the model file).

use crate::dtype::DType;
use crate::engine::{InferenceEngine, TensorDetails};
use crate::tensor::{TensorData, TensorElement};
use crate::Result;
use ndarray::{ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::tensor::PrimitiveTensorElementType;
use ort::value::{DynValue, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration for loading an [`OrtEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrtEngineConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,

    /// Input descriptors, in slot order
    pub inputs: Vec<TensorDetails>,

    /// Output descriptors, in slot order
    pub outputs: Vec<TensorDetails>,

    /// Enable graph optimization
    #[serde(default = "default_optimize_graph")]
    pub optimize_graph: bool,

    /// Intra-op thread count
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_optimize_graph() -> bool {
    true
}

fn default_intra_threads() -> usize {
    1
}

impl OrtEngineConfig {
    /// Read a JSON sidecar. A relative `model_path` is resolved against
    /// the sidecar's directory.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        if config.model_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.model_path = dir.join(&config.model_path);
            }
        }
        Ok(config)
    }
}

/// Input bindings and last results, kept apart from the session.
#[derive(Debug, Default)]
struct Bindings {
    inputs: Vec<TensorDetails>,
    outputs: Vec<TensorDetails>,

    /// Bound inputs keyed by tensor index
    bound: HashMap<usize, TensorData>,

    /// Outputs of the last successful run, keyed by tensor index
    results: HashMap<usize, TensorData>,

    allocated: bool,
}

impl Bindings {
    fn new(inputs: Vec<TensorDetails>, outputs: Vec<TensorDetails>) -> Self {
        Self {
            inputs,
            outputs,
            ..Default::default()
        }
    }

    fn allocate(&mut self) {
        self.bound.clear();
        self.results.clear();
        self.allocated = true;
    }

    fn bind(&mut self, index: usize, tensor: TensorData) -> Result<()> {
        if !self.allocated {
            anyhow::bail!("tensors not allocated; call allocate_tensors first");
        }
        let Some(details) = self.inputs.iter().find(|d| d.index == index) else {
            anyhow::bail!("no input tensor at index {}", index);
        };
        if tensor.dtype() != details.dtype {
            anyhow::bail!(
                "cannot set tensor '{}': got {}, expected {}",
                details.name,
                tensor.dtype(),
                details.dtype
            );
        }

        self.bound.insert(index, tensor);
        Ok(())
    }

    /// Drop the previous results and collect every bound input by name.
    ///
    /// Bindings stay in place, so a failed or repeated run needs no rebinding.
    fn begin_run(&mut self) -> Result<Vec<(String, TensorData)>> {
        self.results.clear();

        if let Some(missing) = self
            .inputs
            .iter()
            .find(|d| !self.bound.contains_key(&d.index))
        {
            anyhow::bail!("input tensor '{}' has not been set", missing.name);
        }

        Ok(self
            .inputs
            .iter()
            .filter_map(|d| {
                self.bound
                    .get(&d.index)
                    .map(|tensor| (d.name.clone(), tensor.clone()))
            })
            .collect())
    }

    fn result(&self, index: usize) -> Result<TensorData> {
        self.results
            .get(&index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no computed tensor at index {}", index))
    }
}

/// Inference engine over an ONNX Runtime session.
pub struct OrtEngine {
    /// ONNX Runtime session
    session: Session,

    bindings: Bindings,
}

impl OrtEngine {
    /// Load the model and build a session.
    ///
    /// # Example
    /// ```no_run
    /// use quant_inference::onnx::{OrtEngine, OrtEngineConfig};
    /// use std::path::Path;
    ///
    /// let config = OrtEngineConfig::from_json_file(Path::new("model.json")).unwrap();
    /// let engine = OrtEngine::new(config).unwrap();
    /// ```
    pub fn new(config: OrtEngineConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(if config.optimize_graph {
                GraphOptimizationLevel::Level3
            } else {
                GraphOptimizationLevel::Level1
            })?
            .with_intra_threads(config.intra_threads.max(1))?
            .commit_from_file(&config.model_path)?;

        info!(
            model = %config.model_path.display(),
            inputs = config.inputs.len(),
            outputs = config.outputs.len(),
            "Loaded ONNX session"
        );

        Ok(Self {
            session,
            bindings: Bindings::new(config.inputs, config.outputs),
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn allocate_tensors(&mut self) -> Result<()> {
        // ort allocates per run; this only resets bindings
        self.bindings.allocate();
        Ok(())
    }

    fn input_details(&self) -> Result<Vec<TensorDetails>> {
        Ok(self.bindings.inputs.clone())
    }

    fn output_details(&self) -> Result<Vec<TensorDetails>> {
        Ok(self.bindings.outputs.clone())
    }

    fn set_tensor(&mut self, index: usize, tensor: TensorData) -> Result<()> {
        self.bindings.bind(index, tensor)
    }

    fn invoke(&mut self) -> Result<()> {
        let mut inputs: Vec<(String, SessionInputValue<'static>)> =
            Vec::with_capacity(self.bindings.inputs.len());
        for (name, tensor) in self.bindings.begin_run()? {
            inputs.push((name, to_value(tensor)?.into()));
        }

        let outputs = self.session.run(inputs)?;

        let mut results = HashMap::with_capacity(self.bindings.outputs.len());
        for details in &self.bindings.outputs {
            let Some(value) = outputs.get(details.name.as_str()) else {
                anyhow::bail!("model produced no output named '{}'", details.name);
            };
            let tensor = from_value(value, details.dtype)?;
            debug!(output = %details.name, shape = ?tensor.shape(), "Extracted output");
            results.insert(details.index, tensor);
        }

        self.bindings.results = results;
        Ok(())
    }

    fn get_tensor(&self, index: usize) -> Result<TensorData> {
        self.bindings.result(index)
    }
}

fn to_value(tensor: TensorData) -> Result<DynValue> {
    Ok(match tensor {
        TensorData::Int8(a) => Tensor::from_array(a)?.into_dyn(),
        TensorData::UInt8(a) => Tensor::from_array(a)?.into_dyn(),
        TensorData::Int16(a) => Tensor::from_array(a)?.into_dyn(),
        TensorData::Int32(a) => Tensor::from_array(a)?.into_dyn(),
        TensorData::Float32(a) => Tensor::from_array(a)?.into_dyn(),
    })
}

fn from_value(value: &DynValue, dtype: DType) -> Result<TensorData> {
    Ok(match dtype {
        DType::Int8 => extract::<i8>(value)?,
        DType::UInt8 => extract::<u8>(value)?,
        DType::Int16 => extract::<i16>(value)?,
        DType::Int32 => extract::<i32>(value)?,
        DType::Float32 => TensorData::Float32(extract_array::<f32>(value)?),
    })
}

fn extract<T>(value: &DynValue) -> Result<TensorData>
where
    T: TensorElement + PrimitiveTensorElementType + Clone,
{
    Ok(T::wrap(extract_array::<T>(value)?))
}

fn extract_array<T>(value: &DynValue) -> Result<ArrayD<T>>
where
    T: PrimitiveTensorElementType + Clone + std::fmt::Debug + 'static,
{
    let (shape, data) = value.try_extract_tensor::<T>()?;
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?)
}
