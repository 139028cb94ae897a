//! Quantized GEMV: Y <- alpha * A * X + beta * Y where A is a bit-packed
//! sub-2-bit matrix with per-block scales.
//!
//! Two-bit codes are read least-significant-bit first from each byte. Rows
//! start on byte boundaries (`ceil(K*2/8)` bytes per row), so a consumer can
//! decode any single row without scanning its predecessors. Accumulation is
//! f32 regardless of input precision.

/// Ternary decode table: 00 -> -1, 01 -> 0, 10 -> +1.
///
/// The encoder never emits 11; the kernel maps it to +1 rather than branching,
/// matching the scalar reference. Corruption detection belongs to the codec
/// decoder, not the multiply path.
pub const TERNARY_LEVELS: [f32; 4] = [-1.0, 0.0, 1.0, 1.0];

/// Quaternary decode table: 00 -> -1.5, 01 -> -0.5, 10 -> +0.5, 11 -> +1.5.
pub const QUATERNARY_LEVELS: [f32; 4] = [-1.5, -0.5, 0.5, 1.5];

/// Packed bytes per row for K two-bit codes.
#[inline]
pub fn packed_bytes_per_row(k: usize) -> usize {
    (k * 2).div_ceil(8)
}

/// Ternary (1.28-bit) GEMV.
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
    gemv_codebook(
        m,
        k,
        alpha,
        a_quantized,
        a_scales,
        x,
        beta,
        y,
        block_size,
        &TERNARY_LEVELS,
    );
}

/// Quaternary (1.58-bit) GEMV.
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
    gemv_codebook(
        m,
        k,
        alpha,
        a_quantized,
        a_scales,
        x,
        beta,
        y,
        block_size,
        &QUATERNARY_LEVELS,
    );
}

/// Shared block-scaled GEMV over an arbitrary 4-entry codebook.
#[allow(clippy::too_many_arguments)]
pub fn gemv_codebook(
    m: usize,
    k: usize,
    alpha: f32,
    a_quantized: &[u8],
    a_scales: &[f32],
    x: &[f32],
    beta: f32,
    y: &mut [f32],
    block_size: usize,
    levels: &[f32; 4],
) {
    assert!(m > 0 && k > 0, "M and K must be > 0");
    assert!(block_size > 0, "block_size must be > 0");

    let bytes_per_row = packed_bytes_per_row(k);
    let blocks_per_row = k.div_ceil(block_size);

    assert!(
        a_quantized.len() >= m * bytes_per_row,
        "packed matrix too short: {} < {}",
        a_quantized.len(),
        m * bytes_per_row
    );
    assert!(
        a_scales.len() >= m * blocks_per_row,
        "scales too short: {} < {}",
        a_scales.len(),
        m * blocks_per_row
    );
    assert!(x.len() >= k, "x too short: {} < {}", x.len(), k);
    assert!(y.len() >= m, "y too short: {} < {}", y.len(), m);

    // Beta pre-pass: beta == 0 zeroes rather than multiplies, so stale NaN/Inf
    // in Y cannot leak into the result.
    if beta == 0.0 {
        y[..m].fill(0.0);
    } else if beta != 1.0 {
        for v in y[..m].iter_mut() {
            *v *= beta;
        }
    }

    for row in 0..m {
        let mut byte_pos = row * bytes_per_row;
        let mut bit_pos = 0u32;
        y[row] += row_dot(
            k,
            alpha,
            a_quantized,
            &a_scales[row * blocks_per_row..(row + 1) * blocks_per_row],
            x,
            block_size,
            levels,
            &mut byte_pos,
            &mut bit_pos,
        );
    }
}

/// Dot product of one packed row with X. Advances the bit cursor in place.
#[allow(clippy::too_many_arguments)]
#[inline]
fn row_dot(
    k: usize,
    alpha: f32,
    a_quantized: &[u8],
    row_scales: &[f32],
    x: &[f32],
    block_size: usize,
    levels: &[f32; 4],
    byte_pos: &mut usize,
    bit_pos: &mut u32,
) -> f32 {
    #[inline(always)]
    fn next_code(data: &[u8], byte_pos: &mut usize, bit_pos: &mut u32) -> usize {
        let code = (data[*byte_pos] >> *bit_pos) & 0b11;
        *bit_pos += 2;
        if *bit_pos >= 8 {
            *byte_pos += 1;
            *bit_pos = 0;
        }
        code as usize
    }

    let mut total = 0.0f32;

    for (block_idx, &scale) in row_scales.iter().enumerate() {
        let k_start = block_idx * block_size;
        let k_end = (k_start + block_size).min(k);
        let combined = scale * alpha;

        #[cfg(target_arch = "aarch64")]
        {
            use core::arch::aarch64::*;

            // SAFETY: k_end <= k <= x.len(); the bit cursor consumes exactly
            // 2*(k_end-k_start) bits, within the validated packed extent.
            unsafe {
                let mut acc = vdupq_n_f32(0.0);
                let combined_vec = vdupq_n_f32(combined);

                let mut ki = k_start;
                while ki + 4 <= k_end {
                    let vals = [
                        levels[next_code(a_quantized, byte_pos, bit_pos)],
                        levels[next_code(a_quantized, byte_pos, bit_pos)],
                        levels[next_code(a_quantized, byte_pos, bit_pos)],
                        levels[next_code(a_quantized, byte_pos, bit_pos)],
                    ];
                    let q_vec = vmulq_f32(vld1q_f32(vals.as_ptr()), combined_vec);
                    let x_vec = vld1q_f32(x.as_ptr().add(ki));
                    acc = vfmaq_f32(acc, q_vec, x_vec);
                    ki += 4;
                }

                let mut tail = 0.0f32;
                while ki < k_end {
                    let code = next_code(a_quantized, byte_pos, bit_pos);
                    tail += levels[code] * combined * x[ki];
                    ki += 1;
                }

                total += vaddvq_f32(acc) + tail;
            }
        }

        #[cfg(not(target_arch = "aarch64"))]
        {
            // Four scalar lanes mirror the NEON accumulation order.
            let mut lanes = [0.0f32; 4];
            let mut ki = k_start;
            while ki + 4 <= k_end {
                for lane in &mut lanes {
                    let code = next_code(a_quantized, byte_pos, bit_pos);
                    *lane += levels[code] * combined * x[ki];
                    ki += 1;
                }
            }
            let mut tail = 0.0f32;
            while ki < k_end {
                let code = next_code(a_quantized, byte_pos, bit_pos);
                tail += levels[code] * combined * x[ki];
                ki += 1;
            }
            total += (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]) + tail;
        }
    }

    total
}

/// Batched ternary GEMV: each X/Y pair in sequence through the single-vector
/// kernel. Parallelism across the batch is the caller's decision.
#[allow(clippy::too_many_arguments)]
pub fn gemv_ternary_batch(
    batch: usize,
    m: usize,
    k: usize,
    a_quantized: &[u8],
    a_scales: &[f32],
    x_batch: &[f32],
    y_batch: &mut [f32],
    block_size: usize,
) {
    assert!(x_batch.len() >= batch * k, "x batch too short");
    assert!(y_batch.len() >= batch * m, "y batch too short");
    for b in 0..batch {
        gemv_ternary(
            m,
            k,
            1.0,
            a_quantized,
            a_scales,
            &x_batch[b * k..(b + 1) * k],
            0.0,
            &mut y_batch[b * m..(b + 1) * m],
            block_size,
        );
    }
}
