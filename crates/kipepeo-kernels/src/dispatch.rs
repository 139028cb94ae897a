//! Kernel dispatch: one entry point per operation.
//!
//! Each entry reads the cached chip identity and switches to the matching
//! per-chip variant. An unknown chip is never an error; dispatch falls
//! through to the generic NEON kernels. FP16 entries widen to FP32 at the
//! boundary when the detected chip does not advertise native FP16.

use half::f16;

use crate::chip::{self, ChipKind};
use crate::gemm::{matmul_f16_tiled, matmul_f16_via_f32, matmul_f32_tiled};
use crate::{apple, gemv, mediatek, qualcomm, unisoc};

/// Chip-dispatched FP32 GEMM: C[MxN] = A[MxK] * B[KxN], row-major.
pub fn matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    matmul_f32_for(chip::detect(), a, b, c, m, n, k);
}

/// FP32 GEMM for an explicit chip identity (tests and pinned-core callers).
pub fn matmul_f32_for(
    chip: ChipKind,
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    m: usize,
    n: usize,
    k: usize,
) {
    match chip {
        ChipKind::MediatekHelioG85
        | ChipKind::MediatekHelioG99
        | ChipKind::MediatekHelioG100 => mediatek::helio_matmul_f32(chip, a, b, c, m, n, k),
        ChipKind::SnapdragonSevenSGen2 => qualcomm::snapdragon_matmul_f32(a, b, c, m, n, k),
        ChipKind::UnisocT606 => unisoc::t606_matmul_f32(a, b, c, m, n, k),
        c_ if c_.is_apple() => apple::apple_matmul_f32(a, b, c, m, n, k),
        _ => matmul_f32_tiled::<4, 4>(a, b, c, m, n, k, false),
    }
}

/// Chip-dispatched FP16 GEMM. Widens to FP32 on chips without native FP16.
pub fn matmul_f16(a: &[f16], b: &[f16], c: &mut [f16], m: usize, n: usize, k: usize) {
    matmul_f16_for(chip::detect(), a, b, c, m, n, k);
}

/// FP16 GEMM for an explicit chip identity.
pub fn matmul_f16_for(
    chip: ChipKind,
    a: &[f16],
    b: &[f16],
    c: &mut [f16],
    m: usize,
    n: usize,
    k: usize,
) {
    match chip {
        ChipKind::MediatekHelioG85
        | ChipKind::MediatekHelioG99
        | ChipKind::MediatekHelioG100 => mediatek::helio_matmul_f16(chip, a, b, c, m, n, k),
        ChipKind::SnapdragonSevenSGen2 => qualcomm::snapdragon_matmul_f16(a, b, c, m, n, k),
        ChipKind::UnisocT606 => unisoc::t606_matmul_f16(a, b, c, m, n, k),
        c_ if c_.is_apple() => apple::apple_matmul_f16(a, b, c, m, n, k),
        _ => {
            if chip.supports_fp16() {
                matmul_f16_tiled::<8, 8>(a, b, c, m, n, k)
            } else {
                matmul_f16_via_f32(a, b, c, m, n, k, |a, b, c, m, n, k| {
                    matmul_f32_tiled::<4, 4>(a, b, c, m, n, k, false)
                })
            }
        }
    }
}

/// Chip-dispatched ternary (1.28-bit) GEMV: Y <- alpha*A*X + beta*Y.
#[allow(clippy::too_many_arguments)]
pub fn gemv_ternary(
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
    match chip::detect() {
        ChipKind::MediatekHelioG85
        | ChipKind::MediatekHelioG99
        | ChipKind::MediatekHelioG100 => mediatek::helio_gemv_ternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        ChipKind::SnapdragonSevenSGen2 => qualcomm::snapdragon_gemv_ternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        ChipKind::UnisocT606 => unisoc::t606_gemv_ternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        c if c.is_apple() => apple::apple_gemv_ternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        _ => gemv::gemv_ternary(m, k, alpha, a_quantized, a_scales, x, beta, y, block_size),
    }
}

/// Chip-dispatched quaternary (1.58-bit) GEMV.
#[allow(clippy::too_many_arguments)]
pub fn gemv_quaternary(
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
    match chip::detect() {
        ChipKind::MediatekHelioG85
        | ChipKind::MediatekHelioG99
        | ChipKind::MediatekHelioG100 => mediatek::helio_gemv_quaternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        ChipKind::SnapdragonSevenSGen2 => qualcomm::snapdragon_gemv_quaternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        ChipKind::UnisocT606 => unisoc::t606_gemv_quaternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        c if c.is_apple() => apple::apple_gemv_quaternary(
            m, k, alpha, a_quantized, a_scales, x, beta, y, block_size,
        ),
        _ => gemv::gemv_quaternary(m, k, alpha, a_quantized, a_scales, x, beta, y, block_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemm::matmul_f32_reference;

    fn gen_matrix(rows: usize, cols: usize, seed: u32) -> Vec<f32> {
        (0..rows * cols)
            .map(|i| {
                let v = (i as u32).wrapping_add(seed).wrapping_mul(2654435761) >> 16;
                (v % 200) as f32 / 100.0 - 1.0
            })
            .collect()
    }

    /// All chip variants agree on random inputs within rounding tolerance
    /// (1 ULP per K accumulation).
    #[test]
    fn test_matmul_f32_equivalence_across_variants() {
        let variants = [
            ChipKind::MediatekHelioG85,
            ChipKind::MediatekHelioG99,
            ChipKind::MediatekHelioG100,
            ChipKind::SnapdragonSevenSGen2,
            ChipKind::UnisocT606,
            ChipKind::AppleM1,
            ChipKind::Unknown,
        ];

        for &(m, n, k) in &[(13, 17, 31), (32, 32, 128), (7, 3, 5)] {
            let a = gen_matrix(m, k, 11);
            let b = gen_matrix(k, n, 13);

            let mut reference = vec![0.0f32; m * n];
            matmul_f32_reference(&a, &b, &mut reference, m, n, k);

            // K accumulations of values bounded by 1: 1 ULP each, with
            // headroom for lane reassociation.
            let tol = k as f32 * f32::EPSILON * 8.0;

            for &chip in &variants {
                let mut c = vec![0.0f32; m * n];
                matmul_f32_for(chip, &a, &b, &mut c, m, n, k);
                let max_diff = c
                    .iter()
                    .zip(reference.iter())
                    .map(|(x, y)| (x - y).abs())
                    .fold(0.0f32, f32::max);
                assert!(
                    max_diff <= tol,
                    "{:?} [{}x{}x{}] diff {} > {}",
                    chip,
                    m,
                    n,
                    k,
                    max_diff,
                    tol
                );
            }
        }
    }

    #[test]
    fn test_matmul_f16_widens_without_native_support() {
        use half::f16;

        let (m, n, k) = (8, 8, 16);
        let a32 = gen_matrix(m, k, 17);
        let b32 = gen_matrix(k, n, 19);
        let a: Vec<f16> = a32.iter().map(|&v| f16::from_f32(v)).collect();
        let b: Vec<f16> = b32.iter().map(|&v| f16::from_f32(v)).collect();

        let mut c_native = vec![f16::ZERO; m * n];
        let mut c_widened = vec![f16::ZERO; m * n];

        // G99 has native FP16; G85 widens. Both should land close.
        matmul_f16_for(ChipKind::MediatekHelioG99, &a, &b, &mut c_native, m, n, k);
        matmul_f16_for(ChipKind::MediatekHelioG85, &a, &b, &mut c_widened, m, n, k);

        for (x, y) in c_native.iter().zip(c_widened.iter()) {
            assert!((x.to_f32() - y.to_f32()).abs() < 0.05);
        }
    }

    #[test]
    fn test_gemv_dispatch_smoke() {
        // K = 8, all +1 codes, 1 row.
        let packed = [0b10_10_10_10u8, 0b10_10_10_10];
        let scales = [0.5f32];
        let x = [1.0f32; 8];
        let mut y = [0.0f32];

        gemv_ternary(1, 8, 1.0, &packed, &scales, &x, 0.0, &mut y, 8);
        assert!((y[0] - 4.0).abs() < 1e-6, "got {}", y[0]);

        let mut y = [0.0f32];
        gemv_quaternary(1, 8, 1.0, &packed, &scales, &x, 0.0, &mut y, 8);
        // code 10 -> +0.5 per element: 8 * 0.5 * 0.5 = 2
        assert!((y[0] - 2.0).abs() < 1e-6, "got {}", y[0]);
    }
}
