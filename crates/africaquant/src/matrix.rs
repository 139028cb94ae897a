//! Row-major matrix quantization and quantized matrix-vector products.
//!
//! A quantized M x K matrix is two caller-owned artifacts:
//! - packed codes: `ceil(K*2/8)` bytes per row, rows byte-aligned
//! - metadata: `M * ceil(K/block)` entries indexed `[row * blocks_per_row + block]`
//!
//! The mat-vec entry points flatten the per-row-per-block scales out of the
//! metadata and hand the packed stream to the chip-dispatched GEMV kernels
//! with alpha = 1, beta = 0.

use rayon::prelude::*;

use kipepeo_kernels::dispatch;

use crate::error::{QuantError, Result};
use crate::pack::{metadata_count, packed_row_bytes};
use crate::quantize::{
    encode_quaternary_stream, encode_ternary_stream, AfricaQuant, BlockMeta, QuantizeConfig,
};

/// Packed bytes required for an M x K matrix, including the safety margin.
pub fn packed_matrix_size(m: usize, k: usize) -> usize {
    m * packed_row_bytes(k) + 16
}

/// Metadata entries required for an M x K matrix at the given block size.
pub fn matrix_metadata_count(m: usize, k: usize, block_size: usize) -> usize {
    m * metadata_count(k, block_size)
}

impl AfricaQuant {
    /// Quantize a row-major M x K weight matrix to the ternary scheme,
    /// row by row. Progress is reported per row when M > 10.
    #[allow(clippy::too_many_arguments)]
    pub fn quantize_matrix_ternary(
        &self,
        weights: &[f32],
        m: usize,
        k: usize,
        output: &mut [u8],
        metadata: &mut [BlockMeta],
        block_size: usize,
        config: Option<&QuantizeConfig>,
    ) -> Result<()> {
        self.quantize_matrix(weights, m, k, output, metadata, block_size, config, true)
    }

    /// Quantize a row-major M x K weight matrix to the quaternary scheme.
    #[allow(clippy::too_many_arguments)]
    pub fn quantize_matrix_quaternary(
        &self,
        weights: &[f32],
        m: usize,
        k: usize,
        output: &mut [u8],
        metadata: &mut [BlockMeta],
        block_size: usize,
        config: Option<&QuantizeConfig>,
    ) -> Result<()> {
        self.quantize_matrix(weights, m, k, output, metadata, block_size, config, false)
    }

    #[allow(clippy::too_many_arguments)]
    fn quantize_matrix(
        &self,
        weights: &[f32],
        m: usize,
        k: usize,
        output: &mut [u8],
        metadata: &mut [BlockMeta],
        block_size: usize,
        config: Option<&QuantizeConfig>,
        ternary: bool,
    ) -> Result<()> {
        if m == 0 || k == 0 {
            return Err(QuantError::EmptyInput);
        }
        if weights.len() < m * k {
            return Err(QuantError::BufferTooSmall {
                required: m * k,
                provided: weights.len(),
            });
        }

        let (neon, caps) = self.snapshot(config);
        let block = self.resolve_block_size(block_size, config, &caps, m * k)?;

        // Threshold is resolved once over the whole matrix so every row sees
        // the same codebook decision surface.
        let threshold = if ternary {
            let cfg_threshold = config.map(|c| c.ternary_threshold).unwrap_or(0.0);
            if cfg_threshold > 0.0 {
                cfg_threshold
            } else if config.map(|c| c.adaptive_threshold).unwrap_or(false) {
                crate::quantize::adaptive_ternary_threshold(&weights[..m * k])
            } else if caps.optimal_ternary_threshold > 0.0 {
                caps.optimal_ternary_threshold
            } else {
                crate::quantize::DEFAULT_TERNARY_THRESHOLD
            }
        } else {
            0.0
        };

        let bytes_per_row = packed_row_bytes(k);
        let blocks_per_row = metadata_count(k, block);

        let required = packed_matrix_size(m, k);
        if output.len() < required {
            return Err(QuantError::BufferTooSmall {
                required,
                provided: output.len(),
            });
        }
        let required_meta = m * blocks_per_row;
        if metadata.len() < required_meta {
            return Err(QuantError::MetadataTooSmall {
                required: required_meta,
                provided: metadata.len(),
            });
        }

        let progress = config.and_then(|c| c.progress.as_deref());
        let report_rows = m > 10;

        for row in 0..m {
            let row_weights = &weights[row * k..(row + 1) * k];
            let row_output = &mut output[row * bytes_per_row..(row + 1) * bytes_per_row];
            let row_meta = &mut metadata[row * blocks_per_row..(row + 1) * blocks_per_row];

            if ternary {
                encode_ternary_stream(row_weights, row_output, row_meta, block, threshold, neon, None)?;
            } else {
                encode_quaternary_stream(row_weights, row_output, row_meta, block, neon, None)?;
            }

            if report_rows {
                if let Some(cb) = progress {
                    cb((row + 1) as f32 / m as f32);
                }
            }
        }

        Ok(())
    }

    /// Y <- A * X for a ternary-quantized A (alpha = 1, beta = 0).
    pub fn matvec_mul_ternary(
        &self,
        quantized_a: &[u8],
        metadata_a: &[BlockMeta],
        x: &[f32],
        y: &mut [f32],
        m: usize,
        k: usize,
    ) -> Result<()> {
        let (scales, block) = extract_scales(metadata_a, m, k)?;
        validate_matvec(quantized_a, x, y, m, k)?;
        dispatch::gemv_ternary(m, k, 1.0, quantized_a, &scales, x, 0.0, y, block);
        Ok(())
    }

    /// Y <- A * X for a quaternary-quantized A (alpha = 1, beta = 0).
    pub fn matvec_mul_quaternary(
        &self,
        quantized_a: &[u8],
        metadata_a: &[BlockMeta],
        x: &[f32],
        y: &mut [f32],
        m: usize,
        k: usize,
    ) -> Result<()> {
        let (scales, block) = extract_scales(metadata_a, m, k)?;
        validate_matvec(quantized_a, x, y, m, k)?;
        dispatch::gemv_quaternary(m, k, 1.0, quantized_a, &scales, x, 0.0, y, block);
        Ok(())
    }

    /// Row-parallel ternary mat-vec. The split happens here, not in the
    /// kernel: each rayon chunk gets a disjoint row range of the packed
    /// stream, scales, and output. Falls back to the serial path below the
    /// parallel threshold.
    pub fn matvec_mul_ternary_parallel(
        &self,
        quantized_a: &[u8],
        metadata_a: &[BlockMeta],
        x: &[f32],
        y: &mut [f32],
        m: usize,
        k: usize,
    ) -> Result<()> {
        const PARALLEL_THRESHOLD: usize = 2048;
        const ROWS_PER_CHUNK: usize = 256;

        if m < PARALLEL_THRESHOLD {
            return self.matvec_mul_ternary(quantized_a, metadata_a, x, y, m, k);
        }

        let (scales, block) = extract_scales(metadata_a, m, k)?;
        validate_matvec(quantized_a, x, y, m, k)?;

        let bytes_per_row = packed_row_bytes(k);
        let blocks_per_row = metadata_count(k, block);

        y[..m].par_chunks_mut(ROWS_PER_CHUNK)
            .enumerate()
            .for_each(|(chunk_idx, y_chunk)| {
                let row_start = chunk_idx * ROWS_PER_CHUNK;
                let rows = y_chunk.len();
                dispatch::gemv_ternary(
                    rows,
                    k,
                    1.0,
                    &quantized_a[row_start * bytes_per_row..],
                    &scales[row_start * blocks_per_row..],
                    x,
                    0.0,
                    y_chunk,
                    block,
                );
            });
        Ok(())
    }
}

/// Flatten per-row-per-block scales out of the metadata, validating each.
fn extract_scales(metadata: &[BlockMeta], m: usize, k: usize) -> Result<(Vec<f32>, usize)> {
    if m == 0 || k == 0 {
        return Err(QuantError::EmptyInput);
    }
    let first = metadata.first().ok_or(QuantError::MetadataTooSmall {
        required: 1,
        provided: 0,
    })?;
    let block = if first.block_size != 0 {
        first.block_size as usize
    } else {
        128
    };

    let blocks_per_row = metadata_count(k, block);
    let required = m * blocks_per_row;
    if metadata.len() < required {
        return Err(QuantError::MetadataTooSmall {
            required,
            provided: metadata.len(),
        });
    }

    let mut scales = Vec::with_capacity(required);
    for (idx, meta) in metadata[..required].iter().enumerate() {
        if meta.scale <= 0.0 || !meta.scale.is_finite() {
            return Err(QuantError::InvalidScale {
                block: idx,
                scale: meta.scale,
            });
        }
        scales.push(meta.scale);
    }
    Ok((scales, block))
}

fn validate_matvec(quantized_a: &[u8], x: &[f32], y: &[f32], m: usize, k: usize) -> Result<()> {
    let required = m * packed_row_bytes(k);
    if quantized_a.len() < required {
        return Err(QuantError::BufferTooSmall {
            required,
            provided: quantized_a.len(),
        });
    }
    if x.len() < k {
        return Err(QuantError::BufferTooSmall {
            required: k,
            provided: x.len(),
        });
    }
    if y.len() < m {
        return Err(QuantError::BufferTooSmall {
            required: m,
            provided: y.len(),
        });
    }
    Ok(())
}
