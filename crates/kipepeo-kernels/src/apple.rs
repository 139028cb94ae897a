//! Apple Silicon variants (A13-A18, M1-M4).
//!
//! Large unified caches allow aggressive 16x16 panels on the performance
//! cores (8x8 on efficiency cores) and prefetch on the streaming loads. All
//! Apple targets have native FP16.

use half::f16;

use crate::gemm::{matmul_f16_tiled, matmul_f32_tiled};
use crate::gemv;

pub fn apple_matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    matmul_f32_tiled::<16, 16>(a, b, c, m, n, k, true);
}

/// Efficiency-core blocking, for callers pinning work to icestorm-class cores.
pub fn apple_matmul_f32_little(
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    m: usize,
    n: usize,
    k: usize,
) {
    matmul_f32_tiled::<8, 8>(a, b, c, m, n, k, true);
}

pub fn apple_matmul_f16(a: &[f16], b: &[f16], c: &mut [f16], m: usize, n: usize, k: usize) {
    matmul_f16_tiled::<16, 16>(a, b, c, m, n, k);
}

#[allow(clippy::too_many_arguments)]
pub fn apple_gemv_ternary(
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
pub fn apple_gemv_quaternary(
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
