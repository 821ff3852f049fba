//! Affine quantization between `f32` and integer storage.
//!
//! `q = x / scale + zero_point` and `x = (q - zero_point) * scale`.
//! How the float intermediate becomes an integer is decided by a
//! [`CastPolicy`], never by an implicit cast.

use crate::dtype::{DType, StorageElement};
use crate::error::QuantError;
use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};

/// Quantization parameters of one tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// Real-valued step represented by one integer increment
    pub scale: f32,

    /// Integer that represents real zero
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    /// Check the parameters against a storage type.
    ///
    /// Float storage is not quantized, so any parameters pass.
    pub fn validate_for(&self, dtype: DType) -> Result<(), QuantError> {
        let Some((min, max)) = dtype.integer_range() else {
            return Ok(());
        };

        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(QuantError::InvalidScale { scale: self.scale });
        }

        let zero_point = self.zero_point as i64;
        if zero_point < min || zero_point > max {
            return Err(QuantError::ZeroPointOutOfRange {
                zero_point: self.zero_point,
                dtype,
            });
        }

        Ok(())
    }
}

impl Default for QuantParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            zero_point: 0,
        }
    }
}

/// How the affine intermediate is reduced to an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Drop the fractional part
    #[default]
    TowardZero,
    /// Round half away from zero
    Nearest,
}

/// What happens to values outside the storage range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overflow {
    /// Clamp to the storage range
    Saturate,
    /// Keep the low bits (two's complement), as a C-style narrowing cast does
    #[default]
    Wrap,
}

/// Narrowing policy used when quantizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CastPolicy {
    pub rounding: Rounding,
    pub overflow: Overflow,
}

impl CastPolicy {
    pub fn new(rounding: Rounding, overflow: Overflow) -> Self {
        Self { rounding, overflow }
    }

    /// Reduce an affine intermediate to storage type `T`.
    #[inline]
    pub fn narrow<T: StorageElement>(&self, value: f64) -> T {
        let value = match self.rounding {
            Rounding::TowardZero => value,
            Rounding::Nearest => value.round(),
        };
        match self.overflow {
            Overflow::Saturate => T::saturating_from_f64(value),
            Overflow::Wrap => T::wrapping_from_f64(value),
        }
    }
}

/// Quantize a single value.
///
/// # Example
/// ```
/// use quant_inference::quantize::{quantize, CastPolicy, QuantParams};
/// let q: i8 = quantize(5.0, QuantParams::new(0.5, 10), CastPolicy::default());
/// assert_eq!(q, 20);
/// ```
#[inline]
pub fn quantize<T: StorageElement>(value: f32, params: QuantParams, policy: CastPolicy) -> T {
    policy.narrow(T::offset(value / params.scale, params.zero_point))
}

/// Dequantize a single value.
#[inline]
pub fn dequantize<T: StorageElement>(value: T, params: QuantParams) -> f32 {
    ((value.to_f64() - params.zero_point as f64) * params.scale as f64) as f32
}

/// Quantize every element of an array, keeping its shape.
pub fn quantize_array<T: StorageElement>(
    input: &ArrayViewD<'_, f32>,
    params: QuantParams,
    policy: CastPolicy,
) -> ArrayD<T> {
    input.mapv(|x| quantize(x, params, policy))
}

/// Dequantize every element of an array, keeping its shape.
pub fn dequantize_array<T: StorageElement>(
    input: &ArrayViewD<'_, T>,
    params: QuantParams,
) -> ArrayD<f32> {
    input.mapv(|q| dequantize(q, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    const SCALE: f32 = 0.5;
    const ZERO_POINT: i32 = 10;

    fn params() -> QuantParams {
        QuantParams::new(SCALE, ZERO_POINT)
    }

    #[test]
    fn test_quantize_scenario() {
        let q: i8 = quantize(5.0, params(), CastPolicy::default());
        assert_eq!(q, 20);
    }

    #[test]
    fn test_dequantize_scenario() {
        let out = dequantize(20i8, QuantParams::new(0.25, 4));
        assert_eq!(out, 4.0);
    }

    #[test]
    fn test_zero_point_identity() {
        for zero_point in [-128, -3, 0, 7, 127] {
            let p = QuantParams::new(0.37, zero_point);
            let q: i8 = quantize(0.0, p, CastPolicy::default());
            assert_eq!(q as i32, zero_point);
            assert_eq!(dequantize(q, p), 0.0);
        }
    }

    fn assert_round_trip<T: StorageElement>(p: QuantParams) {
        for policy in [
            CastPolicy::new(Rounding::TowardZero, Overflow::Wrap),
            CastPolicy::new(Rounding::Nearest, Overflow::Saturate),
        ] {
            for i in -100..100 {
                let x = i as f32 * 0.0731;
                let q: T = quantize(x, p, policy);
                let back = dequantize(q, p);
                assert!(
                    (back - x).abs() <= p.scale * 1.0001,
                    "{}: x={} q={:?} back={}",
                    T::DTYPE,
                    x,
                    q,
                    back
                );
            }
        }
    }

    #[test]
    fn test_round_trip_within_one_step() {
        assert_round_trip::<i8>(QuantParams::new(0.1, -3));
        assert_round_trip::<u8>(QuantParams::new(0.1, 128));
        assert_round_trip::<i16>(QuantParams::new(0.01, -300));
        assert_round_trip::<i32>(QuantParams::new(0.1, 1_000_000));
    }

    #[test]
    fn test_wide_int32_zero_point_is_exact() {
        // 2^24 + 1 rounds to 2^24 in f32
        let p = QuantParams::new(1.0, 16_777_217);
        let q: i32 = quantize(0.0, p, CastPolicy::default());
        assert_eq!(q, 16_777_217);
        assert_eq!(quantize::<i32>(2.0, p, CastPolicy::default()), 16_777_219);
        assert_eq!(dequantize(16_777_217i32, p), 0.0);
        assert_eq!(dequantize(16_777_220i32, p), 3.0);
    }

    #[test]
    fn test_truncation_vs_nearest() {
        let p = QuantParams::new(0.7, 8);
        let truncated: i8 = quantize(2.0, p, CastPolicy::default());
        let nearest: i8 = quantize(2.0, p, CastPolicy::new(Rounding::Nearest, Overflow::Saturate));
        assert_eq!(truncated, 10);
        assert_eq!(nearest, 11);

        let p = QuantParams::new(0.5, 0);
        let truncated: i8 = quantize(-0.8, p, CastPolicy::default());
        let nearest: i8 = quantize(-0.8, p, CastPolicy::new(Rounding::Nearest, Overflow::Saturate));
        assert_eq!(truncated, -1);
        assert_eq!(nearest, -2);
    }

    #[test]
    fn test_overflow_policies() {
        let p = QuantParams::new(1.0, 0);
        let saturate = CastPolicy::new(Rounding::TowardZero, Overflow::Saturate);
        let wrap = CastPolicy::new(Rounding::TowardZero, Overflow::Wrap);

        assert_eq!(quantize::<i8>(200.0, p, saturate), 127);
        assert_eq!(quantize::<i8>(200.0, p, wrap), -56);
        assert_eq!(quantize::<u8>(-1.0, p, saturate), 0);
        assert_eq!(quantize::<u8>(-1.0, p, wrap), 255);
    }

    #[test]
    fn test_default_policy_wraps_like_a_narrowing_cast() {
        let p = QuantParams::new(1.0, 0);
        assert_eq!(quantize::<i8>(200.0, p, CastPolicy::default()), -56);
        assert_eq!(quantize::<i8>(-129.0, p, CastPolicy::default()), 127);
        assert_eq!(quantize::<i8>(-2.9, p, CastPolicy::default()), -2);
    }

    #[test]
    fn test_nan_quantizes_to_zero() {
        let p = QuantParams::new(1.0, 0);
        assert_eq!(quantize::<i8>(f32::NAN, p, CastPolicy::default()), 0);
        let wrap = CastPolicy::new(Rounding::Nearest, Overflow::Wrap);
        assert_eq!(quantize::<u8>(f32::NAN, p, wrap), 0);
    }

    #[test]
    fn test_array_roundtrip_keeps_shape() {
        let input = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let q = quantize_array::<u8>(&input.view(), params(), CastPolicy::default());
        assert_eq!(q.shape(), &[2, 3]);
        assert_eq!(q[IxDyn(&[1, 2])], 22);

        let back = dequantize_array(&q.view(), params());
        assert_eq!(back, input);
    }

    #[test]
    fn test_validate_for() {
        assert!(params().validate_for(DType::Int8).is_ok());
        assert_eq!(
            QuantParams::new(0.0, 0).validate_for(DType::Int8),
            Err(QuantError::InvalidScale { scale: 0.0 })
        );
        assert!(matches!(
            QuantParams::new(f32::NAN, 0).validate_for(DType::UInt8),
            Err(QuantError::InvalidScale { .. })
        ));
        assert_eq!(
            QuantParams::new(1.0, -1).validate_for(DType::UInt8),
            Err(QuantError::ZeroPointOutOfRange {
                zero_point: -1,
                dtype: DType::UInt8
            })
        );
        // float tensors report (0.0, 0)
        assert!(QuantParams::new(0.0, 0).validate_for(DType::Float32).is_ok());
    }

    #[test]
    fn test_cast_policy_serde_defaults() {
        let policy: CastPolicy = serde_json::from_str(r#"{"rounding": "nearest"}"#).unwrap();
        assert_eq!(policy.rounding, Rounding::Nearest);
        assert_eq!(policy.overflow, Overflow::Wrap);
    }
}
