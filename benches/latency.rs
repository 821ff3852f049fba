//! Latency benchmarks for quantized prediction.
//!
//! # Benchmarks
//!
//! ## Quantization
//! - `quantize_int8`: float array to int8, per tensor size
//! - `quantize_uint8_nearest`: same with round-to-nearest and wrapping
//! - `dequantize_int8`: int8 array back to float
//!
//! ## End-to-End
//! - `predict_identity`: allocate, quantize, bind, invoke, read, dequantize
//!   against a loopback engine, so only the crate's own overhead is measured
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench -- predict_identity
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array, ArrayD, Dimension, IxDyn};

/// Typical TinyML input sizes: sine (1), speech (49x40), person detect (96x96).
const SHAPES: &[&[usize]] = &[&[1, 1], &[1, 49, 40, 1], &[1, 96, 96, 1]];

fn input(shape: &[usize]) -> ArrayD<f32> {
    Array::from_shape_fn(IxDyn(shape), |ix| {
        let i: usize = ix.slice().iter().sum();
        (i as f32 * 0.37).sin() * 4.0
    })
}

fn label(shape: &[usize]) -> String {
    shape
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("x")
}

fn benchmark_quantize(c: &mut Criterion) {
    use quant_inference::quantize::{dequantize_array, quantize_array};
    use quant_inference::{CastPolicy, Overflow, QuantParams, Rounding};

    let params = QuantParams::new(0.03, -12);
    let mut group = c.benchmark_group("quantization");

    for shape in SHAPES {
        let data = input(shape);
        let view = data.view();

        group.bench_with_input(BenchmarkId::new("quantize_int8", label(shape)), shape, |b, _| {
            b.iter(|| quantize_array::<i8>(black_box(&view), params, CastPolicy::default()));
        });

        let policy = CastPolicy::new(Rounding::Nearest, Overflow::Wrap);
        group.bench_with_input(
            BenchmarkId::new("quantize_uint8_nearest", label(shape)),
            shape,
            |b, _| {
                b.iter(|| quantize_array::<u8>(black_box(&view), params, policy));
            },
        );

        let quantized = quantize_array::<i8>(&view, params, CastPolicy::default());
        let quantized_view = quantized.view();
        group.bench_with_input(BenchmarkId::new("dequantize_int8", label(shape)), shape, |b, _| {
            b.iter(|| dequantize_array(black_box(&quantized_view), params));
        });
    }

    group.finish();
}

fn benchmark_predict(c: &mut Criterion) {
    use quant_inference::{predict, DType, IdentityEngine, QuantParams, TensorDetails};

    let mut group = c.benchmark_group("predict_identity");

    for shape in SHAPES {
        let mut engine = IdentityEngine::new(
            TensorDetails::new(
                "input",
                0,
                shape.to_vec(),
                DType::Int8,
                QuantParams::new(0.03, -12),
            ),
            TensorDetails::new(
                "output",
                1,
                shape.to_vec(),
                DType::Int8,
                QuantParams::new(0.05, 3),
            ),
        );
        let data = input(shape);

        group.bench_with_input(BenchmarkId::from_parameter(label(shape)), shape, |b, _| {
            b.iter(|| predict(&mut engine, black_box(data.view())));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_quantize, benchmark_predict);
criterion_main!(benches);
