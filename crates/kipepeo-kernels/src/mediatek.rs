//! MediaTek Helio variants.
//!
//! Helio G85 pairs Cortex-A75/A55 with small caches, so it stays on the
//! conservative 4x4 panel and has no native FP16. G99/G100 are Cortex-A76/A55
//! (64KB L1, 256KB L2): 6x6 FP32 panels and 8x8 native-FP16 panels.

use half::f16;

use crate::chip::ChipKind;
use crate::gemm::{matmul_f16_tiled, matmul_f16_via_f32, matmul_f32_tiled};
use crate::gemv;

/// Helio G85: 4x4 blocking, no prefetch.
pub fn helio_g85_matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    matmul_f32_tiled::<4, 4>(a, b, c, m, n, k, false);
}

/// Helio G99/G100: 6x6 blocking on the A76 big cores.
pub fn helio_g99_matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    matmul_f32_tiled::<6, 6>(a, b, c, m, n, k, false);
}

/// Family-level FP32 entry used by the dispatcher.
pub fn helio_matmul_f32(
    chip: ChipKind,
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    m: usize,
    n: usize,
    k: usize,
) {
    match chip {
        ChipKind::MediatekHelioG85 => helio_g85_matmul_f32(a, b, c, m, n, k),
        _ => helio_g99_matmul_f32(a, b, c, m, n, k),
    }
}

/// Family-level FP16 entry. G85 widens to the FP32 path at the boundary;
/// G99/G100 run the native 8x8 FP16 panel.
pub fn helio_matmul_f16(
    chip: ChipKind,
    a: &[f16],
    b: &[f16],
    c: &mut [f16],
    m: usize,
    n: usize,
    k: usize,
) {
    if chip.supports_fp16() {
        matmul_f16_tiled::<8, 8>(a, b, c, m, n, k);
    } else {
        matmul_f16_via_f32(a, b, c, m, n, k, |a, b, c, m, n, k| {
            helio_g85_matmul_f32(a, b, c, m, n, k)
        });
    }
}

/// Ternary GEMV: the A76 dot-product extension buys nothing for the 2-bit
/// decode loop, so the shared kernel is used as-is.
#[allow(clippy::too_many_arguments)]
pub fn helio_gemv_ternary(
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
pub fn helio_gemv_quaternary(
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
