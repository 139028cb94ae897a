//! Vector quantization: the 1.28-bit ternary and 1.58-bit quaternary
//! encoders and decoders, block by block.
//!
//! Scheme summary, per block of `block_size` consecutive weights:
//!   ternary:    scale = max|w| (1.0 for all-zero blocks); w/scale thresholded
//!               at +/-tau into {-1, 0, +1}
//!   quaternary: scale = max|w| / 1.5; w/scale binned into
//!               {-1.5, -0.5, +0.5, +1.5}
//!
//! The codec instance serializes configuration reads under a single mutex and
//! releases it before the math, so concurrent instances never contend on
//! actual quantization work.

use std::sync::{Arc, Mutex};

use kipepeo_core::hardware::{self, HardwareCapabilities};

use crate::codebook::{
    decode_quaternary, decode_ternary, encode_ternary, quantize_quaternary_value,
    quantize_ternary_value, QUATERNARY_ARITY, TERNARY_ARITY,
};
use crate::error::{QuantError, Result};
use crate::pack::{metadata_count, packed_buffer_size, packed_row_bytes, BitReader, BitWriter};

/// Per-block quantization metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMeta {
    /// Positive, finite scale. All-zero blocks record 1.0.
    pub scale: f32,
    /// Always 0.0 for the symmetric codebooks.
    pub zero_point: f32,
    /// Block size this entry was produced with.
    pub block_size: u32,
    /// Codebook arity: 3 for ternary, 4 for quaternary.
    pub codebook_size: u32,
}

impl Default for BlockMeta {
    fn default() -> Self {
        Self {
            scale: 1.0,
            zero_point: 0.0,
            block_size: 0,
            codebook_size: 0,
        }
    }
}

/// Progress observation callback: called with completion in [0, 1].
pub type ProgressFn = dyn Fn(f32) + Send + Sync;

/// Optional per-call configuration.
#[derive(Clone)]
pub struct QuantizeConfig {
    /// Block size when the call site passes 0. Must be in {64, 128, 256};
    /// 0 defers to the hardware recommendation.
    pub block_size: u32,
    /// Ternary threshold override. 0.0 = hardware default or adaptive.
    pub ternary_threshold: f32,
    /// Derive the ternary threshold from the weight distribution.
    pub adaptive_threshold: bool,
    /// Progress callback, invoked per block for vectors with > 100 blocks and
    /// per row for matrices with > 10 rows.
    pub progress: Option<Arc<ProgressFn>>,
    /// Hardware capability override (tests, cross-device tuning).
    pub hardware: Option<HardwareCapabilities>,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            block_size: 0,
            ternary_threshold: 0.0,
            adaptive_threshold: true,
            progress: None,
            hardware: None,
        }
    }
}

impl std::fmt::Debug for QuantizeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantizeConfig")
            .field("block_size", &self.block_size)
            .field("ternary_threshold", &self.ternary_threshold)
            .field("adaptive_threshold", &self.adaptive_threshold)
            .field("progress", &self.progress.is_some())
            .field("hardware", &self.hardware.is_some())
            .finish()
    }
}

/// Default ternary threshold when neither config nor hardware narrows it.
pub const DEFAULT_TERNARY_THRESHOLD: f32 = 0.33;

/// Adaptive ternary threshold from the sample's coefficient of variation:
/// tight distributions get a lower threshold, wide ones a higher.
pub fn adaptive_ternary_threshold(weights: &[f32]) -> f32 {
    if weights.is_empty() {
        return DEFAULT_TERNARY_THRESHOLD;
    }

    // Stride-sample at most 10k elements.
    let sample_size = weights.len().min(10_000);
    let step = (weights.len() / sample_size).max(1);

    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut max_abs = 0.0f32;
    let mut n = 0usize;
    let mut i = 0;
    while i < weights.len() {
        let val = weights[i];
        sum += val;
        sum_sq += val * val;
        max_abs = max_abs.max(val.abs());
        n += 1;
        i += step;
    }

    let mean = sum / n as f32;
    let variance = (sum_sq / n as f32 - mean * mean).max(0.0);
    let std_dev = variance.sqrt();

    if max_abs > 0.0 {
        let cv = std_dev / max_abs;
        if cv > 0.5 {
            return 0.35;
        }
        if cv < 0.2 {
            return 0.28;
        }
    }
    DEFAULT_TERNARY_THRESHOLD
}

/// Max |w| over a block. NEON when enabled and the block start is 16-byte
/// aligned; silently scalar otherwise.
fn block_max_abs(vals: &[f32], use_neon: bool) -> f32 {
    #[cfg(target_arch = "aarch64")]
    {
        if use_neon && hardware::is_neon_aligned(vals.as_ptr()) && vals.len() >= 8 {
            use core::arch::aarch64::*;
            // SAFETY: chunks of 8 stay within vals; the tail is scalar.
            unsafe {
                let mut max1 = vdupq_n_f32(0.0);
                let mut max2 = vdupq_n_f32(0.0);
                let mut i = 0;
                while i + 8 <= vals.len() {
                    let v1 = vld1q_f32(vals.as_ptr().add(i));
                    let v2 = vld1q_f32(vals.as_ptr().add(i + 4));
                    max1 = vmaxq_f32(max1, vabsq_f32(v1));
                    max2 = vmaxq_f32(max2, vabsq_f32(v2));
                    i += 8;
                }
                let mut max_abs = vmaxvq_f32(max1).max(vmaxvq_f32(max2));
                while i < vals.len() {
                    max_abs = max_abs.max(vals[i].abs());
                    i += 1;
                }
                return max_abs;
            }
        }
    }
    let _ = use_neon;
    vals.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
}

/// Validate the scale derived from a block maximum.
fn block_scale(max_abs: f32, divisor: f32, block: usize) -> Result<f32> {
    let scale = if max_abs > 0.0 { max_abs / divisor } else { 1.0 };
    if scale <= 0.0 || !scale.is_finite() {
        return Err(QuantError::InvalidScale { block, scale });
    }
    Ok(scale)
}

fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || !block_size.is_power_of_two() {
        return Err(QuantError::InvalidBlockSize(block_size));
    }
    Ok(())
}

/// Internal ternary encoder over an exact-size row buffer (no safety margin).
/// Used directly by the matrix path; the vector entry points add the margin
/// requirement of the public size formula.
#[allow(clippy::too_many_arguments)]
pub(crate) fn encode_ternary_stream(
    weights: &[f32],
    output: &mut [u8],
    metadata: &mut [BlockMeta],
    block_size: usize,
    threshold: f32,
    use_neon: bool,
    progress: Option<&ProgressFn>,
) -> Result<usize> {
    let count = weights.len();
    if count == 0 {
        return Err(QuantError::EmptyInput);
    }
    validate_block_size(block_size)?;

    let row_bytes = packed_row_bytes(count);
    if output.len() < row_bytes {
        return Err(QuantError::BufferTooSmall {
            required: row_bytes,
            provided: output.len(),
        });
    }
    let num_blocks = metadata_count(count, block_size);
    if metadata.len() < num_blocks {
        return Err(QuantError::MetadataTooSmall {
            required: num_blocks,
            provided: metadata.len(),
        });
    }

    let report_blocks = num_blocks > 100;
    let mut writer = BitWriter::new(output);

    for (block_idx, chunk) in weights.chunks(block_size).enumerate() {
        if report_blocks {
            if let Some(cb) = progress {
                cb(block_idx as f32 / num_blocks as f32);
            }
        }

        let max_abs = block_max_abs(chunk, use_neon);
        let scale = block_scale(max_abs, 1.0, block_idx)?;
        let inv_scale = 1.0 / scale;

        metadata[block_idx] = BlockMeta {
            scale,
            zero_point: 0.0,
            block_size: block_size as u32,
            codebook_size: TERNARY_ARITY,
        };

        for &w in chunk {
            let trit = quantize_ternary_value(w * inv_scale, threshold);
            writer.push(encode_ternary(trit))?;
        }
    }

    let written = writer.finish()?;
    if let Some(cb) = progress {
        cb(1.0);
    }
    Ok(written)
}

/// Internal quaternary encoder, same contract as [`encode_ternary_stream`].
pub(crate) fn encode_quaternary_stream(
    weights: &[f32],
    output: &mut [u8],
    metadata: &mut [BlockMeta],
    block_size: usize,
    use_neon: bool,
    progress: Option<&ProgressFn>,
) -> Result<usize> {
    let count = weights.len();
    if count == 0 {
        return Err(QuantError::EmptyInput);
    }
    validate_block_size(block_size)?;

    let row_bytes = packed_row_bytes(count);
    if output.len() < row_bytes {
        return Err(QuantError::BufferTooSmall {
            required: row_bytes,
            provided: output.len(),
        });
    }
    let num_blocks = metadata_count(count, block_size);
    if metadata.len() < num_blocks {
        return Err(QuantError::MetadataTooSmall {
            required: num_blocks,
            provided: metadata.len(),
        });
    }

    let report_blocks = num_blocks > 100;
    let mut writer = BitWriter::new(output);

    for (block_idx, chunk) in weights.chunks(block_size).enumerate() {
        if report_blocks {
            if let Some(cb) = progress {
                cb(block_idx as f32 / num_blocks as f32);
            }
        }

        let max_abs = block_max_abs(chunk, use_neon);
        let scale = block_scale(max_abs, 1.5, block_idx)?;
        let inv_scale = 1.0 / scale;

        metadata[block_idx] = BlockMeta {
            scale,
            zero_point: 0.0,
            block_size: block_size as u32,
            codebook_size: QUATERNARY_ARITY,
        };

        for &w in chunk {
            writer.push(quantize_quaternary_value(w * inv_scale))?;
        }
    }

    let written = writer.finish()?;
    if let Some(cb) = progress {
        cb(1.0);
    }
    Ok(written)
}

/// Resolve the decode block size: explicit parameter wins, then the first
/// metadata entry, then the 128 default.
fn resolve_decode_block(block_size: usize, metadata: &[BlockMeta]) -> usize {
    if block_size != 0 {
        return block_size;
    }
    match metadata.first() {
        Some(meta) if meta.block_size != 0 => meta.block_size as usize,
        _ => 128,
    }
}

/// Decode a ternary stream back to floats. Errors on the 0b11 code.
pub(crate) fn decode_ternary_stream(
    quantized: &[u8],
    count: usize,
    output: &mut [f32],
    metadata: &[BlockMeta],
    block_size: usize,
) -> Result<()> {
    if count == 0 {
        return Err(QuantError::EmptyInput);
    }
    let block_size = resolve_decode_block(block_size, metadata);
    validate_block_size(block_size)?;

    let row_bytes = packed_row_bytes(count);
    if quantized.len() < row_bytes {
        return Err(QuantError::BufferTooSmall {
            required: row_bytes,
            provided: quantized.len(),
        });
    }
    if output.len() < count {
        return Err(QuantError::BufferTooSmall {
            required: count,
            provided: output.len(),
        });
    }
    let num_blocks = metadata_count(count, block_size);
    if metadata.len() < num_blocks {
        return Err(QuantError::MetadataTooSmall {
            required: num_blocks,
            provided: metadata.len(),
        });
    }

    let mut reader = BitReader::new(quantized);
    for block_idx in 0..num_blocks {
        let start = block_idx * block_size;
        let end = (start + block_size).min(count);

        let scale = metadata[block_idx].scale;
        if scale <= 0.0 || !scale.is_finite() {
            return Err(QuantError::InvalidScale {
                block: block_idx,
                scale,
            });
        }

        for (offset, out) in output[start..end].iter_mut().enumerate() {
            let code = reader.next();
            let trit = decode_ternary(code).ok_or(QuantError::InvalidCode {
                index: start + offset,
                code,
            })?;
            *out = trit as f32 * scale;
        }
    }
    Ok(())
}

/// Decode a quaternary stream back to floats. All four codes are valid.
pub(crate) fn decode_quaternary_stream(
    quantized: &[u8],
    count: usize,
    output: &mut [f32],
    metadata: &[BlockMeta],
    block_size: usize,
) -> Result<()> {
    if count == 0 {
        return Err(QuantError::EmptyInput);
    }
    let block_size = resolve_decode_block(block_size, metadata);
    validate_block_size(block_size)?;

    let row_bytes = packed_row_bytes(count);
    if quantized.len() < row_bytes {
        return Err(QuantError::BufferTooSmall {
            required: row_bytes,
            provided: quantized.len(),
        });
    }
    if output.len() < count {
        return Err(QuantError::BufferTooSmall {
            required: count,
            provided: output.len(),
        });
    }
    let num_blocks = metadata_count(count, block_size);
    if metadata.len() < num_blocks {
        return Err(QuantError::MetadataTooSmall {
            required: num_blocks,
            provided: metadata.len(),
        });
    }

    let mut reader = BitReader::new(quantized);
    for block_idx in 0..num_blocks {
        let start = block_idx * block_size;
        let end = (start + block_size).min(count);

        let scale = metadata[block_idx].scale;
        if scale <= 0.0 || !scale.is_finite() {
            return Err(QuantError::InvalidScale {
                block: block_idx,
                scale,
            });
        }

        for out in output[start..end].iter_mut() {
            *out = decode_quaternary(reader.next()) * scale;
        }
    }
    Ok(())
}

struct CodecState {
    neon_enabled: bool,
    caps: HardwareCapabilities,
}

/// The AfricaQuant codec instance.
///
/// Mutating entry points (NEON toggle, capability override) and the
/// configuration snapshot at the start of each quantize call are serialized
/// by a per-instance mutex; the math itself runs with the lock released.
/// Construct one instance per thread to bypass the serialization entirely.
pub struct AfricaQuant {
    state: Mutex<CodecState>,
}

impl Default for AfricaQuant {
    fn default() -> Self {
        Self::new()
    }
}

impl AfricaQuant {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CodecState {
                neon_enabled: cfg!(target_arch = "aarch64"),
                caps: hardware::detect(),
            }),
        }
    }

    /// Whether NEON paths are currently enabled on this instance.
    pub fn has_neon_support(&self) -> bool {
        self.state.lock().expect("codec mutex poisoned").neon_enabled
    }

    /// Enable or disable NEON paths. Disabled off-target regardless.
    pub fn set_neon_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().expect("codec mutex poisoned");
        state.neon_enabled = enabled && cfg!(target_arch = "aarch64");
    }

    /// Snapshot of the cached hardware capabilities.
    pub fn hardware_capabilities(&self) -> HardwareCapabilities {
        self.state.lock().expect("codec mutex poisoned").caps.clone()
    }

    /// Override the cached hardware capabilities.
    pub fn set_hardware_capabilities(&self, caps: HardwareCapabilities) {
        self.state.lock().expect("codec mutex poisoned").caps = caps;
    }

    /// Take the config snapshot under the lock, then release it.
    pub(crate) fn snapshot(&self, config: Option<&QuantizeConfig>) -> (bool, HardwareCapabilities) {
        let state = self.state.lock().expect("codec mutex poisoned");
        let caps = config
            .and_then(|c| c.hardware.clone())
            .unwrap_or_else(|| state.caps.clone());
        (state.neon_enabled, caps)
    }

    /// Resolve the effective block size for an encode call.
    ///
    /// A non-zero `block_size` argument is accepted for any positive power of
    /// two; a configured default must come from the supported set.
    pub(crate) fn resolve_block_size(
        &self,
        block_size: usize,
        config: Option<&QuantizeConfig>,
        caps: &HardwareCapabilities,
        count: usize,
    ) -> Result<usize> {
        if block_size != 0 {
            return Ok(block_size);
        }
        if let Some(cfg) = config {
            if cfg.block_size != 0 {
                if !kipepeo_core::config::SUPPORTED_BLOCK_SIZES.contains(&cfg.block_size) {
                    return Err(QuantError::UnsupportedBlockSize(cfg.block_size));
                }
                return Ok(cfg.block_size as usize);
            }
        }
        let block = hardware::optimal_block_size(count, caps.available_memory) as usize;
        log::debug!(
            "auto-selected block size {} for {} weights ({} MB available)",
            block,
            count,
            caps.available_memory / (1024 * 1024)
        );
        Ok(block)
    }

    fn resolve_threshold(
        weights: &[f32],
        config: Option<&QuantizeConfig>,
        caps: &HardwareCapabilities,
    ) -> f32 {
        if let Some(cfg) = config {
            if cfg.ternary_threshold > 0.0 {
                return cfg.ternary_threshold;
            }
            if cfg.adaptive_threshold {
                return adaptive_ternary_threshold(weights);
            }
        }
        if caps.optimal_ternary_threshold > 0.0 {
            caps.optimal_ternary_threshold
        } else {
            DEFAULT_TERNARY_THRESHOLD
        }
    }

    /// 1.28-bit ternary encode. `block_size` 0 selects automatically.
    ///
    /// `output` must hold at least [`packed_buffer_size`]`(weights.len())`
    /// bytes and `metadata` at least ⌈count / block⌉ entries, both
    /// caller-allocated.
    pub fn quantize_ternary(
        &self,
        weights: &[f32],
        output: &mut [u8],
        metadata: &mut [BlockMeta],
        block_size: usize,
        config: Option<&QuantizeConfig>,
    ) -> Result<()> {
        if weights.is_empty() {
            return Err(QuantError::EmptyInput);
        }
        let (neon, caps) = self.snapshot(config);
        let block = self.resolve_block_size(block_size, config, &caps, weights.len())?;
        let threshold = Self::resolve_threshold(weights, config, &caps);

        let required = packed_buffer_size(weights.len());
        if output.len() < required {
            return Err(QuantError::BufferTooSmall {
                required,
                provided: output.len(),
            });
        }

        let progress = config.and_then(|c| c.progress.as_deref());
        encode_ternary_stream(weights, output, metadata, block, threshold, neon, progress)?;
        Ok(())
    }

    /// 1.28-bit ternary decode.
    pub fn dequantize_ternary(
        &self,
        quantized: &[u8],
        count: usize,
        output: &mut [f32],
        metadata: &[BlockMeta],
        block_size: usize,
    ) -> Result<()> {
        decode_ternary_stream(quantized, count, output, metadata, block_size)
    }

    /// 1.58-bit quaternary encode. Same buffer contract as the ternary path.
    pub fn quantize_quaternary(
        &self,
        weights: &[f32],
        output: &mut [u8],
        metadata: &mut [BlockMeta],
        block_size: usize,
        config: Option<&QuantizeConfig>,
    ) -> Result<()> {
        if weights.is_empty() {
            return Err(QuantError::EmptyInput);
        }
        let (neon, caps) = self.snapshot(config);
        let block = self.resolve_block_size(block_size, config, &caps, weights.len())?;

        let required = packed_buffer_size(weights.len());
        if output.len() < required {
            return Err(QuantError::BufferTooSmall {
                required,
                provided: output.len(),
            });
        }

        let progress = config.and_then(|c| c.progress.as_deref());
        encode_quaternary_stream(weights, output, metadata, block, neon, progress)?;
        Ok(())
    }

    /// 1.58-bit quaternary decode.
    pub fn dequantize_quaternary(
        &self,
        quantized: &[u8],
        count: usize,
        output: &mut [f32],
        metadata: &[BlockMeta],
        block_size: usize,
    ) -> Result<()> {
        decode_quaternary_stream(quantized, count, output, metadata, block_size)
    }

    /// Legacy boolean wrapper around [`Self::quantize_ternary`].
    pub fn quantize_ternary_legacy(
        &self,
        weights: &[f32],
        output: &mut [u8],
        metadata: &mut [BlockMeta],
        block_size: usize,
    ) -> bool {
        self.quantize_ternary(weights, output, metadata, block_size, None)
            .is_ok()
    }

    /// Legacy boolean wrapper around [`Self::dequantize_ternary`].
    pub fn dequantize_ternary_legacy(
        &self,
        quantized: &[u8],
        count: usize,
        output: &mut [f32],
        metadata: &[BlockMeta],
        block_size: usize,
    ) -> bool {
        self.dequantize_ternary(quantized, count, output, metadata, block_size)
            .is_ok()
    }

    /// Legacy boolean wrapper around [`Self::quantize_quaternary`].
    pub fn quantize_quaternary_legacy(
        &self,
        weights: &[f32],
        output: &mut [u8],
        metadata: &mut [BlockMeta],
        block_size: usize,
    ) -> bool {
        self.quantize_quaternary(weights, output, metadata, block_size, None)
            .is_ok()
    }

    /// Legacy boolean wrapper around [`Self::dequantize_quaternary`].
    pub fn dequantize_quaternary_legacy(
        &self,
        quantized: &[u8],
        count: usize,
        output: &mut [f32],
        metadata: &[BlockMeta],
        block_size: usize,
    ) -> bool {
        self.dequantize_quaternary(quantized, count, output, metadata, block_size)
            .is_ok()
    }
}
