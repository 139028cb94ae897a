//! Typed errors for the quantization codec.
//!
//! Every validation predicate gets its own variant so callers (and tests) can
//! tell failures apart. Legacy boolean entry points collapse these to false.

use thiserror::Error;

/// Errors surfaced by the AfricaQuant codec.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum QuantError {
    /// Zero-length input.
    #[error("weight count must be > 0")]
    EmptyInput,

    /// Block size is zero or not a power of two.
    #[error("invalid block size {0}: must be a positive power of two")]
    InvalidBlockSize(usize),

    /// Caller-provided buffer is shorter than the size formula requires.
    #[error("buffer too small: required {required} bytes, got {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    /// Metadata array shorter than ceil(count / block_size) entries.
    #[error("metadata too small: required {required} entries, got {provided}")]
    MetadataTooSmall { required: usize, provided: usize },

    /// The encoder would write past the caller-provided output bound.
    /// Output contents are undefined after this error.
    #[error("packed output overflow at byte {0}")]
    BufferOverflow(usize),

    /// A computed or stored block scale is non-finite or non-positive.
    #[error("invalid scale {scale} in block {block}")]
    InvalidScale { block: usize, scale: f32 },

    /// The decoder met a two-bit code its codebook has no entry for
    /// (stream corruption; the ternary encoder never emits 11).
    #[error("invalid code {code:#04b} at weight index {index}")]
    InvalidCode { index: usize, code: u8 },

    /// Configured block size outside the supported set {64, 128, 256}.
    #[error("unsupported configured block size {0}: must be 64, 128, or 256")]
    UnsupportedBlockSize(u32),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, QuantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_are_distinct() {
        let errs = [
            QuantError::EmptyInput,
            QuantError::InvalidBlockSize(3),
            QuantError::BufferTooSmall {
                required: 48,
                provided: 16,
            },
            QuantError::BufferOverflow(12),
            QuantError::InvalidScale {
                block: 0,
                scale: f32::NAN,
            },
            QuantError::InvalidCode { index: 7, code: 3 },
            QuantError::UnsupportedBlockSize(96),
        ];
        for (i, a) in errs.iter().enumerate() {
            for (j, b) in errs.iter().enumerate() {
                if i != j {
                    assert_ne!(
                        std::mem::discriminant(a),
                        std::mem::discriminant(b),
                        "{a} vs {b}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_display() {
        let err = QuantError::InvalidCode { index: 42, code: 3 };
        assert!(err.to_string().contains("0b11"));
        assert!(err.to_string().contains("42"));
    }
}
