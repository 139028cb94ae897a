//! AfricaQuant — sub-2-bit weight quantization for low-end handsets.
//!
//! Two schemes, both two bits per weight on disk with one f32 scale per
//! block:
//! - 1.28-bit ternary: codebook {-1, 0, +1}, threshold quantization
//! - 1.58-bit quaternary: codebook {-1.5, -0.5, +0.5, +1.5}
//!
//! The packed stream and metadata array are caller-owned; layout and size
//! formulas live in [`pack`]. Matrix products go through the chip-dispatched
//! GEMV kernels in `kipepeo-kernels`.

pub mod codebook;
pub mod error;
pub mod matrix;
pub mod pack;
pub mod quantize;

pub use error::{QuantError, Result};
pub use matrix::{matrix_metadata_count, packed_matrix_size};
pub use pack::{metadata_count, packed_buffer_size, packed_row_bytes};
pub use quantize::{
    adaptive_ternary_threshold, AfricaQuant, BlockMeta, QuantizeConfig,
    DEFAULT_TERNARY_THRESHOLD,
};
