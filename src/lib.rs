//! Quantized inference over a fixed-point engine.
//!
//! Float input is rescaled into the engine's integer domain, one forward pass
//! runs, and the integer output is rescaled back to float. The engine itself
//! is an external collaborator behind [`InferenceEngine`].

pub mod dtype;
pub mod engine;
pub mod error;
pub mod onnx;
pub mod predictor;
pub mod quantize;
pub mod tensor;

pub use dtype::{DType, StorageElement};
pub use engine::{IdentityEngine, InferenceEngine, TensorDetails};
pub use error::QuantError;
pub use onnx::{OrtEngine, OrtEngineConfig};
pub use predictor::{predict, predict_with, Config, QuantizedPredictor};
pub use quantize::{dequantize, quantize, CastPolicy, Overflow, QuantParams, Rounding};
pub use tensor::TensorData;

/// Library-wide error type.
pub type Result<T> = anyhow::Result<T>;
