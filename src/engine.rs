//! Inference engine contract.
//!
//! The engine owns tensor allocation, graph execution, and kernels. The
//! predictor only talks to it through [`InferenceEngine`], reading one
//! [`TensorDetails`] record per input/output slot.

use crate::dtype::DType;
use crate::quantize::QuantParams;
use crate::tensor::TensorData;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Descriptor of one engine input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDetails {
    /// Tensor name in the model graph
    pub name: String,

    /// Index used with `set_tensor` / `get_tensor`
    pub index: usize,

    /// Declared shape; empty when the model leaves it dynamic
    #[serde(default)]
    pub shape: Vec<usize>,

    /// Storage type
    pub dtype: DType,

    /// Affine parameters; `(0.0, 0)` for float tensors
    #[serde(default = "float_quantization")]
    pub quantization: QuantParams,
}

fn float_quantization() -> QuantParams {
    QuantParams::new(0.0, 0)
}

impl TensorDetails {
    pub fn new(
        name: impl Into<String>,
        index: usize,
        shape: Vec<usize>,
        dtype: DType,
        quantization: QuantParams,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            shape,
            dtype,
            quantization,
        }
    }
}

/// A loaded model that executes one forward pass at a time.
///
/// Every method may fail; the caller passes such faults through unchanged.
pub trait InferenceEngine {
    /// Prepare internal buffers for execution.
    fn allocate_tensors(&mut self) -> Result<()>;

    /// Descriptors of the model inputs, in slot order.
    fn input_details(&self) -> Result<Vec<TensorDetails>>;

    /// Descriptors of the model outputs, in slot order.
    fn output_details(&self) -> Result<Vec<TensorDetails>>;

    /// Bind a tensor to the input at `index`.
    fn set_tensor(&mut self, index: usize, tensor: TensorData) -> Result<()>;

    /// Run one synchronous forward pass.
    fn invoke(&mut self) -> Result<()>;

    /// Copy out the tensor at `index`.
    fn get_tensor(&self, index: usize) -> Result<TensorData>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn allocate_tensors(&mut self) -> Result<()> {
        (**self).allocate_tensors()
    }

    fn input_details(&self) -> Result<Vec<TensorDetails>> {
        (**self).input_details()
    }

    fn output_details(&self) -> Result<Vec<TensorDetails>> {
        (**self).output_details()
    }

    fn set_tensor(&mut self, index: usize, tensor: TensorData) -> Result<()> {
        (**self).set_tensor(index, tensor)
    }

    fn invoke(&mut self) -> Result<()> {
        (**self).invoke()
    }

    fn get_tensor(&self, index: usize) -> Result<TensorData> {
        (**self).get_tensor(index)
    }
}

/// Single-input, single-output engine whose forward pass copies the input.
///
/// Useful for checking the quantize/dequantize wiring without a model: the
/// raw integers bound to the input come back as the raw output, so the
/// result depends only on the two descriptors.
#[derive(Debug, Clone)]
pub struct IdentityEngine {
    input: TensorDetails,
    output: TensorDetails,
    allocated: bool,
    bound: Option<TensorData>,
    result: Option<TensorData>,
}

impl IdentityEngine {
    /// Create an engine from its two descriptors.
    ///
    /// Input and output must share a dtype; this is checked at `invoke`.
    pub fn new(input: TensorDetails, output: TensorDetails) -> Self {
        Self {
            input,
            output,
            allocated: false,
            bound: None,
            result: None,
        }
    }

    /// Whether a forward pass result is ready to be read back.
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

impl InferenceEngine for IdentityEngine {
    fn allocate_tensors(&mut self) -> Result<()> {
        self.allocated = true;
        self.bound = None;
        self.result = None;
        Ok(())
    }

    fn input_details(&self) -> Result<Vec<TensorDetails>> {
        Ok(vec![self.input.clone()])
    }

    fn output_details(&self) -> Result<Vec<TensorDetails>> {
        Ok(vec![self.output.clone()])
    }

    fn set_tensor(&mut self, index: usize, tensor: TensorData) -> Result<()> {
        if !self.allocated {
            anyhow::bail!("tensors not allocated; call allocate_tensors first");
        }
        if index != self.input.index {
            anyhow::bail!("no input tensor at index {}", index);
        }
        if tensor.dtype() != self.input.dtype {
            anyhow::bail!(
                "cannot set tensor '{}': got {}, expected {}",
                self.input.name,
                tensor.dtype(),
                self.input.dtype
            );
        }
        if !self.input.shape.is_empty() && tensor.shape() != self.input.shape.as_slice() {
            anyhow::bail!(
                "cannot set tensor '{}': dimension mismatch, got {:?}, expected {:?}",
                self.input.name,
                tensor.shape(),
                self.input.shape
            );
        }

        self.bound = Some(tensor);
        Ok(())
    }

    fn invoke(&mut self) -> Result<()> {
        let Some(tensor) = self.bound.as_ref() else {
            anyhow::bail!("input tensor '{}' has not been set", self.input.name);
        };
        if tensor.dtype() != self.output.dtype {
            anyhow::bail!(
                "identity pass cannot convert {} to {}",
                tensor.dtype(),
                self.output.dtype
            );
        }

        self.result = Some(tensor.clone());
        Ok(())
    }

    /// Read back the output, or the bound input when asked for its index,
    /// as a TFLite interpreter allows.
    fn get_tensor(&self, index: usize) -> Result<TensorData> {
        if index == self.input.index {
            if let Some(tensor) = &self.bound {
                return Ok(tensor.clone());
            }
        }
        if index != self.output.index {
            anyhow::bail!("no tensor at index {}", index);
        }

        self.result.clone().ok_or_else(|| {
            anyhow::anyhow!("output tensor '{}' has not been computed", self.output.name)
        })
    }
}
