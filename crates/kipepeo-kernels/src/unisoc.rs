//! Unisoc T606 variants.
//!
//! Cortex-A75/A55 with small caches: conservative 4x4 panels, no native FP16
//! (the FP16 entry widens through the FP32 path).

use half::f16;

use crate::gemm::{matmul_f16_via_f32, matmul_f32_tiled};
use crate::gemv;

pub fn t606_matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    matmul_f32_tiled::<4, 4>(a, b, c, m, n, k, false);
}

pub fn t606_matmul_f16(a: &[f16], b: &[f16], c: &mut [f16], m: usize, n: usize, k: usize) {
    matmul_f16_via_f32(a, b, c, m, n, k, |a, b, c, m, n, k| {
        t606_matmul_f32(a, b, c, m, n, k)
    });
}

#[allow(clippy::too_many_arguments)]
pub fn t606_gemv_ternary(
    m: usize,
    k: usize,
    alpha: f32,
    a_quantized: &[u8],
    a_scales: &[f32],
    x: &[f32],
    beta: f32,
    y: &mut [f32],
    block_size: usize,
) {
    gemv::gemv_ternary(m, k, alpha, a_quantized, a_scales, x, beta, y, block_size);
}

#[allow(clippy::too_many_arguments)]
pub fn t606_gemv_quaternary(
    m: usize,
    k: usize,
    alpha: f32,
    a_quantized: &[u8],
    a_scales: &[f32],
    x: &[f32],
    beta: f32,
    y: &mut [f32],
    block_size: usize,
) {
    gemv::gemv_quaternary(m, k, alpha, a_quantized, a_scales, x, beta, y, block_size);
}
