//! Local fault taxonomy.
//!
//! Engine faults are never translated into these variants; they travel
//! through [`crate::Result`] untouched. `QuantError` only covers what the
//! quantization layer itself can detect.

use crate::dtype::DType;
use thiserror::Error;

/// Faults raised by the quantization layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantError {
    #[error("invalid quantization scale {scale}: must be finite and greater than zero")]
    InvalidScale { scale: f32 },

    #[error("zero point {zero_point} does not fit storage type {dtype}")]
    ZeroPointOutOfRange { zero_point: i32, dtype: DType },

    #[error("dtype mismatch for tensor '{name}': expected {expected}, got {actual}")]
    DTypeMismatch {
        name: String,
        expected: DType,
        actual: DType,
    },

    #[error("no {kind} tensor at slot {slot} (engine exposes {available})")]
    MissingTensor {
        kind: &'static str,
        slot: usize,
        available: usize,
    },

    #[error("output tensor '{name}' is a scalar; expected a leading batch axis")]
    ScalarOutput { name: String },

    #[error("output tensor '{name}' has an empty batch axis")]
    EmptyBatch { name: String },
}
