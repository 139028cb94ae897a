//! Dense FP32/FP16 matrix multiplication.
//!
//! One tiled kernel, parameterized over the micro-panel (MR x NR); the
//! per-chip modules instantiate it with their tuned tile sizes. The inner
//! loop streams along K in SIMD-lane chunks, accumulating with fused
//! multiply-add into per-tile registers; each accumulator lane is reduced
//! horizontally at store time. K tails fall through a scalar loop.
//!
//! FP16 storage uses `half::f16`; arithmetic always widens to f32, so FP16
//! kernels differ from FP32 only in panel shape and element width.

use half::f16;

/// Prefetch 64 bytes ahead of a streaming read position.
#[inline(always)]
#[allow(unused_variables, dead_code)]
fn prefetch_read<T>(ptr: *const T) {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: prfm is a hint; it never faults, even on wild addresses.
    unsafe {
        core::arch::asm!(
            "prfm pldl1keep, [{0}]",
            in(reg) (ptr as *const u8).wrapping_add(64),
            options(nostack, preserves_flags)
        );
    }
}

/// Reference FP32 GEMM: C[MxN] = A[MxK] * B[KxN], row-major, no blocking.
pub fn matmul_f32_reference(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    check_dims(a.len(), b.len(), c.len(), m, n, k);
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += a[i * k + p] * b[p * n + j];
            }
            c[i * n + j] = sum;
        }
    }
}

fn check_dims(a_len: usize, b_len: usize, c_len: usize, m: usize, n: usize, k: usize) {
    let mk = m.checked_mul(k).expect("M*K overflow");
    let kn = k.checked_mul(n).expect("K*N overflow");
    let mn = m.checked_mul(n).expect("M*N overflow");
    assert!(a_len >= mk, "A too short: {} < {}", a_len, mk);
    assert!(b_len >= kn, "B too short: {} < {}", b_len, kn);
    assert!(c_len >= mn, "C too short: {} < {}", c_len, mn);
}

/// Tiled FP32 GEMM over an MR x NR register tile.
///
/// Output tiles are zeroed before accumulation. `prefetch` emits software
/// cache hints 64 bytes ahead of the A and B read positions; only the A78
/// class and Apple variants enable it.
pub fn matmul_f32_tiled<const MR: usize, const NR: usize>(
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    m: usize,
    n: usize,
    k: usize,
    prefetch: bool,
) {
    check_dims(a.len(), b.len(), c.len(), m, n, k);
    c[..m * n].fill(0.0);

    let mut i = 0;
    while i < m {
        let m_block = MR.min(m - i);
        let mut j = 0;
        while j < n {
            let n_block = NR.min(n - j);
            tile_f32::<MR, NR>(a, b, c, i, j, m_block, n_block, n, k, prefetch);
            j += NR;
        }
        i += MR;
    }
}

/// One MR x NR output tile, NEON along K in chunks of 4.
#[cfg(target_arch = "aarch64")]
#[allow(clippy::too_many_arguments)]
fn tile_f32<const MR: usize, const NR: usize>(
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    i: usize,
    j: usize,
    m_block: usize,
    n_block: usize,
    n: usize,
    k: usize,
    prefetch: bool,
) {
    use core::arch::aarch64::*;

    // SAFETY: all indices below stay within the bounds validated by
    // check_dims; m_block/n_block clip the tile at the matrix edges.
    unsafe {
        let mut acc = [[vdupq_n_f32(0.0); NR]; MR];

        let mut p = 0;
        while p + 4 <= k {
            let mut a_vec = [vdupq_n_f32(0.0); MR];
            for (ii, slot) in a_vec.iter_mut().enumerate().take(m_block) {
                let a_ptr = a.as_ptr().add((i + ii) * k + p);
                if prefetch {
                    prefetch_read(a_ptr);
                }
                *slot = vld1q_f32(a_ptr);
            }

            for jj in 0..n_block {
                // Gather the strided B column into a lane vector.
                let b_ptr = b.as_ptr().add(p * n + j + jj);
                if prefetch {
                    prefetch_read(b_ptr);
                }
                let b_vals = [
                    *b.get_unchecked(p * n + j + jj),
                    *b.get_unchecked((p + 1) * n + j + jj),
                    *b.get_unchecked((p + 2) * n + j + jj),
                    *b.get_unchecked((p + 3) * n + j + jj),
                ];
                let b_vec = vld1q_f32(b_vals.as_ptr());

                for ii in 0..m_block {
                    acc[ii][jj] = vfmaq_f32(acc[ii][jj], a_vec[ii], b_vec);
                }
            }
            p += 4;
        }

        // K tail: scalar accumulation straight into C.
        while p < k {
            for ii in 0..m_block {
                let a_val = *a.get_unchecked((i + ii) * k + p);
                for jj in 0..n_block {
                    let idx = (i + ii) * n + (j + jj);
                    *c.get_unchecked_mut(idx) += a_val * *b.get_unchecked(p * n + j + jj);
                }
            }
            p += 1;
        }

        // Horizontal reduction of each accumulator lane.
        for (ii, row) in acc.iter().enumerate().take(m_block) {
            for (jj, lane) in row.iter().enumerate().take(n_block) {
                let idx = (i + ii) * n + (j + jj);
                *c.get_unchecked_mut(idx) += vaddvq_f32(*lane);
            }
        }
    }
}

/// Scalar tile for non-NEON targets. Same blocking, same lane-chunked
/// accumulation order so that results track the NEON path.
#[cfg(not(target_arch = "aarch64"))]
#[allow(clippy::too_many_arguments)]
fn tile_f32<const MR: usize, const NR: usize>(
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    i: usize,
    j: usize,
    m_block: usize,
    n_block: usize,
    n: usize,
    k: usize,
    _prefetch: bool,
) {
    let mut acc = [[[0.0f32; 4]; NR]; MR];

    let mut p = 0;
    while p + 4 <= k {
        for ii in 0..m_block {
            for jj in 0..n_block {
                for lane in 0..4 {
                    acc[ii][jj][lane] +=
                        a[(i + ii) * k + p + lane] * b[(p + lane) * n + j + jj];
                }
            }
        }
        p += 4;
    }

    while p < k {
        for ii in 0..m_block {
            let a_val = a[(i + ii) * k + p];
            for jj in 0..n_block {
                c[(i + ii) * n + (j + jj)] += a_val * b[p * n + j + jj];
            }
        }
        p += 1;
    }

    for ii in 0..m_block {
        for jj in 0..n_block {
            let lanes = acc[ii][jj];
            c[(i + ii) * n + (j + jj)] += (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]);
        }
    }
}

/// Tiled FP16 GEMM. Storage is `f16`; accumulation is f32.
pub fn matmul_f16_tiled<const MR: usize, const NR: usize>(
    a: &[f16],
    b: &[f16],
    c: &mut [f16],
    m: usize,
    n: usize,
    k: usize,
) {
    check_dims(a.len(), b.len(), c.len(), m, n, k);

    let mut i = 0;
    while i < m {
        let m_block = MR.min(m - i);
        let mut j = 0;
        while j < n {
            let n_block = NR.min(n - j);
            for ii in 0..m_block {
                for jj in 0..n_block {
                    let mut sum = 0.0f32;
                    for p in 0..k {
                        sum += a[(i + ii) * k + p].to_f32() * b[p * n + (j + jj)].to_f32();
                    }
                    c[(i + ii) * n + (j + jj)] = f16::from_f32(sum);
                }
            }
            j += NR;
        }
        i += MR;
    }
}

/// Widen an f16 matrix product through the FP32 path.
///
/// Used when the detected chip does not advertise native FP16: the FP16
/// entry converts at the boundary and runs the chip's FP32 kernel.
pub fn matmul_f16_via_f32<F>(a: &[f16], b: &[f16], c: &mut [f16], m: usize, n: usize, k: usize, f32_kernel: F)
where
    F: Fn(&[f32], &[f32], &mut [f32], usize, usize, usize),
{
    check_dims(a.len(), b.len(), c.len(), m, n, k);
    let a32: Vec<f32> = a[..m * k].iter().map(|v| v.to_f32()).collect();
    let b32: Vec<f32> = b[..k * n].iter().map(|v| v.to_f32()).collect();
    let mut c32 = vec![0.0f32; m * n];
    f32_kernel(&a32, &b32, &mut c32, m, n, k);
    for (dst, src) in c[..m * n].iter_mut().zip(c32.iter()) {
        *dst = f16::from_f32(*src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen_matrix(rows: usize, cols: usize, seed: u32) -> Vec<f32> {
        (0..rows * cols)
            .map(|i| {
                let v = (i as u32)
                    .wrapping_add(seed)
                    .wrapping_mul(2654435761)
                    >> 16;
                (v % 200) as f32 / 100.0 - 1.0
            })
            .collect()
    }

    fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0f32, f32::max)
    }

    #[test]
    fn test_tiled_matches_reference_4x4() {
        for &(m, n, k) in &[(8, 8, 8), (5, 7, 9), (1, 1, 1), (16, 16, 64)] {
            let a = gen_matrix(m, k, 1);
            let b = gen_matrix(k, n, 2);
            let mut c_ref = vec![0.0f32; m * n];
            let mut c_tiled = vec![0.0f32; m * n];

            matmul_f32_reference(&a, &b, &mut c_ref, m, n, k);
            matmul_f32_tiled::<4, 4>(&a, &b, &mut c_tiled, m, n, k, false);

            let diff = max_abs_diff(&c_ref, &c_tiled);
            assert!(diff < 1e-4, "[{}x{}x{}] max diff {}", m, n, k, diff);
        }
    }

    #[test]
    fn test_tiled_tile_sizes_agree() {
        let (m, n, k) = (17, 23, 65); // ragged on purpose
        let a = gen_matrix(m, k, 3);
        let b = gen_matrix(k, n, 4);

        let mut c4 = vec![0.0f32; m * n];
        let mut c6 = vec![0.0f32; m * n];
        let mut c8 = vec![0.0f32; m * n];
        let mut c16 = vec![0.0f32; m * n];

        matmul_f32_tiled::<4, 4>(&a, &b, &mut c4, m, n, k, false);
        matmul_f32_tiled::<6, 6>(&a, &b, &mut c6, m, n, k, false);
        matmul_f32_tiled::<8, 8>(&a, &b, &mut c8, m, n, k, true);
        matmul_f32_tiled::<16, 16>(&a, &b, &mut c16, m, n, k, true);

        assert!(max_abs_diff(&c4, &c6) < 1e-4);
        assert!(max_abs_diff(&c4, &c8) < 1e-4);
        assert!(max_abs_diff(&c4, &c16) < 1e-4);
    }

    #[test]
    fn test_tiled_overwrites_stale_output() {
        let (m, n, k) = (4, 4, 4);
        let a = gen_matrix(m, k, 5);
        let b = gen_matrix(k, n, 6);
        let mut c = vec![123.0f32; m * n];
        let mut c_ref = vec![0.0f32; m * n];

        matmul_f32_tiled::<4, 4>(&a, &b, &mut c, m, n, k, false);
        matmul_f32_reference(&a, &b, &mut c_ref, m, n, k);

        assert!(max_abs_diff(&c, &c_ref) < 1e-4);
    }

    #[test]
    fn test_f16_tiled_matches_f32() {
        let (m, n, k) = (6, 6, 32);
        let a32 = gen_matrix(m, k, 7);
        let b32 = gen_matrix(k, n, 8);
        let a: Vec<f16> = a32.iter().map(|&v| f16::from_f32(v)).collect();
        let b: Vec<f16> = b32.iter().map(|&v| f16::from_f32(v)).collect();

        let mut c = vec![f16::ZERO; m * n];
        matmul_f16_tiled::<8, 8>(&a, &b, &mut c, m, n, k);

        // Reference on the f16-rounded inputs, so only accumulation differs.
        let a_round: Vec<f32> = a.iter().map(|v| v.to_f32()).collect();
        let b_round: Vec<f32> = b.iter().map(|v| v.to_f32()).collect();
        let mut c_ref = vec![0.0f32; m * n];
        matmul_f32_reference(&a_round, &b_round, &mut c_ref, m, n, k);

        for (got, want) in c.iter().zip(c_ref.iter()) {
            assert!((got.to_f32() - want).abs() < 0.05, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_f16_widening_path() {
        let (m, n, k) = (5, 5, 16);
        let a32 = gen_matrix(m, k, 9);
        let b32 = gen_matrix(k, n, 10);
        let a: Vec<f16> = a32.iter().map(|&v| f16::from_f32(v)).collect();
        let b: Vec<f16> = b32.iter().map(|&v| f16::from_f32(v)).collect();

        let mut c_wide = vec![f16::ZERO; m * n];
        let mut c_tiled = vec![f16::ZERO; m * n];

        matmul_f16_via_f32(&a, &b, &mut c_wide, m, n, k, |a, b, c, m, n, k| {
            matmul_f32_tiled::<4, 4>(a, b, c, m, n, k, false)
        });
        matmul_f16_tiled::<4, 4>(&a, &b, &mut c_tiled, m, n, k);

        for (x, y) in c_wide.iter().zip(c_tiled.iter()) {
            assert!((x.to_f32() - y.to_f32()).abs() < 0.05);
        }
    }
}
