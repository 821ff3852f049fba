//! Storage types of engine tensors.
//!
//! The engine decides how a tensor is stored; this module gives each storage
//! type a static description and explicit narrowing/widening conversions so
//! no float-to-integer cast happens implicitly anywhere else in the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of an engine tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int8,
    UInt8,
    Int16,
    Int32,
    Float32,
}

impl DType {
    /// Whether tensors of this type carry affine quantization.
    pub fn is_quantized(&self) -> bool {
        !matches!(self, DType::Float32)
    }

    /// Inclusive integer range of the storage type.
    ///
    /// Returns `None` for `Float32`.
    pub fn integer_range(&self) -> Option<(i64, i64)> {
        match self {
            DType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DType::UInt8 => Some((u8::MIN as i64, u8::MAX as i64)),
            DType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            DType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DType::Float32 => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Float32 => "float32",
        };
        f.write_str(name)
    }
}

/// An integer type that can hold quantized tensor elements.
pub trait StorageElement: Copy + Send + Sync + fmt::Debug + 'static {
    /// Storage tag of this element type.
    const DTYPE: DType;

    /// Add the zero point to a scaled value.
    ///
    /// Narrow types add in `f32`, which is exact for every representable
    /// zero point. `i32` zero points above 2^24 are not exact in `f32`, so
    /// that type adds in `f64`.
    #[inline]
    fn offset(scaled: f32, zero_point: i32) -> f64 {
        (scaled + zero_point as f32) as f64
    }

    /// Narrow, clamping to `[MIN, MAX]`. NaN becomes 0.
    fn saturating_from_f64(value: f64) -> Self;

    /// Narrow by truncating to `i64` and keeping the low bits. NaN becomes 0.
    fn wrapping_from_f64(value: f64) -> Self;

    /// Widen to `f64`; exact for every storage type.
    fn to_f64(self) -> f64;
}

macro_rules! impl_storage_element {
    ($($ty:ty => $dtype:expr $(, offset($s:ident, $z:ident) $offset:block)?);* $(;)?) => {
        $(
            impl StorageElement for $ty {
                const DTYPE: DType = $dtype;

                $(
                    #[inline]
                    fn offset($s: f32, $z: i32) -> f64 $offset
                )?

                #[inline]
                fn saturating_from_f64(value: f64) -> Self {
                    value as $ty
                }

                #[inline]
                fn wrapping_from_f64(value: f64) -> Self {
                    (value as i64) as $ty
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_storage_element! {
    i8 => DType::Int8;
    u8 => DType::UInt8;
    i16 => DType::Int16;
    i32 => DType::Int32, offset(scaled, zero_point) {
        scaled as f64 + zero_point as f64
    };
}
