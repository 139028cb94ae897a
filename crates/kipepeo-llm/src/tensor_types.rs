//! Tensor element-type descriptors for the hosting LLM runtime.
//!
//! The runtime advertises new quantized element kinds through its own
//! type-trait table; these descriptors carry everything that table needs:
//! the block layout and plain function pointers for quantize/dequantize with
//! the codec's semantics. Each function constructs its own codec instance, so
//! the runtime may call them from any thread without sharing state.

use africaquant::{
    packed_row_bytes, AfricaQuant, BlockMeta, Result,
};

/// Block layout of a quantized element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Weights per block.
    pub block_size: u32,
    /// Packed code bytes per full block (two bits per weight).
    pub packed_bytes_per_block: usize,
    /// Bytes of scale storage per block (one f32 in the metadata array).
    pub scale_bytes_per_block: usize,
    /// Codebook arity: 3 ternary, 4 quaternary.
    pub codebook_arity: u32,
}

/// Quantize function contract: row-major weights into a caller-allocated
/// packed buffer and metadata array at the given block size.
pub type QuantizeFn =
    fn(weights: &[f32], output: &mut [u8], metadata: &mut [BlockMeta], block_size: usize) -> Result<()>;

/// Dequantize function contract: packed codes plus metadata back to floats.
pub type DequantizeFn = fn(
    quantized: &[u8],
    count: usize,
    output: &mut [f32],
    metadata: &[BlockMeta],
    block_size: usize,
) -> Result<()>;

/// One registrable tensor element kind.
#[derive(Clone, Copy)]
pub struct TensorTypeDesc {
    /// Type name as it appears in the runtime's type table.
    pub name: &'static str,
    /// Nominal bits per weight (the stream itself is two bits per weight).
    pub bits_per_weight: f32,
    pub block: BlockDescriptor,
    pub quantize: QuantizeFn,
    pub dequantize: DequantizeFn,
}

impl std::fmt::Debug for TensorTypeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorTypeDesc")
            .field("name", &self.name)
            .field("bits_per_weight", &self.bits_per_weight)
            .field("block", &self.block)
            .finish()
    }
}

const DEFAULT_BLOCK: u32 = 128;

fn quantize_ternary(
    weights: &[f32],
    output: &mut [u8],
    metadata: &mut [BlockMeta],
    block_size: usize,
) -> Result<()> {
    AfricaQuant::new().quantize_ternary(weights, output, metadata, block_size, None)
}

fn dequantize_ternary(
    quantized: &[u8],
    count: usize,
    output: &mut [f32],
    metadata: &[BlockMeta],
    block_size: usize,
) -> Result<()> {
    AfricaQuant::new().dequantize_ternary(quantized, count, output, metadata, block_size)
}

fn quantize_quaternary(
    weights: &[f32],
    output: &mut [u8],
    metadata: &mut [BlockMeta],
    block_size: usize,
) -> Result<()> {
    AfricaQuant::new().quantize_quaternary(weights, output, metadata, block_size, None)
}

fn dequantize_quaternary(
    quantized: &[u8],
    count: usize,
    output: &mut [f32],
    metadata: &[BlockMeta],
    block_size: usize,
) -> Result<()> {
    AfricaQuant::new().dequantize_quaternary(quantized, count, output, metadata, block_size)
}

/// The two element kinds this crate contributes to a runtime's type table.
pub fn tensor_types() -> [TensorTypeDesc; 2] {
    [
        TensorTypeDesc {
            name: "KIPEPEO_T128",
            bits_per_weight: 1.28,
            block: BlockDescriptor {
                block_size: DEFAULT_BLOCK,
                packed_bytes_per_block: packed_row_bytes(DEFAULT_BLOCK as usize),
                scale_bytes_per_block: 4,
                codebook_arity: 3,
            },
            quantize: quantize_ternary,
            dequantize: dequantize_ternary,
        },
        TensorTypeDesc {
            name: "KIPEPEO_Q158",
            bits_per_weight: 1.58,
            block: BlockDescriptor {
                block_size: DEFAULT_BLOCK,
                packed_bytes_per_block: packed_row_bytes(DEFAULT_BLOCK as usize),
                scale_bytes_per_block: 4,
                codebook_arity: 4,
            },
            quantize: quantize_quaternary,
            dequantize: dequantize_quaternary,
        },
    ]
}
