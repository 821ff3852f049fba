//! Dtype-tagged tensors exchanged with an engine.

use crate::dtype::{DType, StorageElement};
use crate::error::QuantError;
use crate::quantize::{dequantize_array, quantize_array, CastPolicy, QuantParams};
use ndarray::{ArrayD, ArrayViewD, Axis};

/// An owned tensor in one of the engine's storage types.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Int8(ArrayD<i8>),
    UInt8(ArrayD<u8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Float32(ArrayD<f32>),
}

impl TensorData {
    /// Storage type of the tensor.
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Int8(_) => DType::Int8,
            TensorData::UInt8(_) => DType::UInt8,
            TensorData::Int16(_) => DType::Int16,
            TensorData::Int32(_) => DType::Int32,
            TensorData::Float32(_) => DType::Float32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            TensorData::Int8(a) => a.shape(),
            TensorData::UInt8(a) => a.shape(),
            TensorData::Int16(a) => a.shape(),
            TensorData::Int32(a) => a.shape(),
            TensorData::Float32(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Quantize a float array into `dtype` storage.
    ///
    /// Float storage takes the input unchanged. Integer storage requires
    /// valid `params` (positive finite scale, in-range zero point).
    pub fn quantize(
        input: &ArrayViewD<'_, f32>,
        dtype: DType,
        params: QuantParams,
        policy: CastPolicy,
    ) -> Result<Self, QuantError> {
        params.validate_for(dtype)?;

        Ok(match dtype {
            DType::Int8 => TensorData::Int8(quantize_array(input, params, policy)),
            DType::UInt8 => TensorData::UInt8(quantize_array(input, params, policy)),
            DType::Int16 => TensorData::Int16(quantize_array(input, params, policy)),
            DType::Int32 => TensorData::Int32(quantize_array(input, params, policy)),
            DType::Float32 => TensorData::Float32(input.to_owned()),
        })
    }

    /// Widen to `f32` and dequantize with `params`.
    ///
    /// Float tensors are returned unchanged.
    pub fn dequantize(&self, params: QuantParams) -> ArrayD<f32> {
        match self {
            TensorData::Int8(a) => dequantize_array(&a.view(), params),
            TensorData::UInt8(a) => dequantize_array(&a.view(), params),
            TensorData::Int16(a) => dequantize_array(&a.view(), params),
            TensorData::Int32(a) => dequantize_array(&a.view(), params),
            TensorData::Float32(a) => a.clone(),
        }
    }

    /// Keep only the first element along the leading (batch) axis.
    ///
    /// `name` is used for error reporting only.
    pub fn first_batch(&self, name: &str) -> Result<Self, QuantError> {
        if self.shape().is_empty() {
            return Err(QuantError::ScalarOutput {
                name: name.to_string(),
            });
        }
        if self.shape()[0] == 0 {
            return Err(QuantError::EmptyBatch {
                name: name.to_string(),
            });
        }

        Ok(match self {
            TensorData::Int8(a) => TensorData::Int8(first_along_batch(a)),
            TensorData::UInt8(a) => TensorData::UInt8(first_along_batch(a)),
            TensorData::Int16(a) => TensorData::Int16(first_along_batch(a)),
            TensorData::Int32(a) => TensorData::Int32(first_along_batch(a)),
            TensorData::Float32(a) => TensorData::Float32(first_along_batch(a)),
        })
    }
}

fn first_along_batch<T: Clone>(array: &ArrayD<T>) -> ArrayD<T> {
    array.index_axis(Axis(0), 0).to_owned()
}

/// Typed access to the array inside a [`TensorData`].
pub trait TensorElement: StorageElement {
    fn wrap(array: ArrayD<Self>) -> TensorData;
    fn view(tensor: &TensorData) -> Option<ArrayViewD<'_, Self>>;
}

macro_rules! impl_tensor_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl TensorElement for $ty {
                fn wrap(array: ArrayD<Self>) -> TensorData {
                    TensorData::$variant(array)
                }

                fn view(tensor: &TensorData) -> Option<ArrayViewD<'_, Self>> {
                    match tensor {
                        TensorData::$variant(a) => Some(a.view()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_tensor_element! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    i32 => Int32,
}
