//! Qualcomm Snapdragon 7s Gen 2 variants.
//!
//! Cortex-A78/A55 with 512KB L2: 8x8 FP32 panels, 12x12 native-FP16 panels,
//! and software prefetch on the streaming loads (the A78 prefetchers leave
//! measurable headroom on the strided B accesses).

use half::f16;

use crate::gemm::{matmul_f16_tiled, matmul_f32_tiled};
use crate::gemv;

pub fn snapdragon_matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    matmul_f32_tiled::<8, 8>(a, b, c, m, n, k, true);
}

pub fn snapdragon_matmul_f16(a: &[f16], b: &[f16], c: &mut [f16], m: usize, n: usize, k: usize) {
    matmul_f16_tiled::<12, 12>(a, b, c, m, n, k);
}

#[allow(clippy::too_many_arguments)]
pub fn snapdragon_gemv_ternary(
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
pub fn snapdragon_gemv_quaternary(
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
