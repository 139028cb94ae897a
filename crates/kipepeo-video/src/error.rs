//! Typed errors for the video wrappers.

use thiserror::Error;

/// Errors surfaced by the encoder/decoder wrappers and the rate controller.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VideoError {
    /// The underlying codec library rejected the configuration.
    #[error("codec initialization failed: {0}")]
    Init(String),

    /// No decoder backend was compiled in (the `dav1d` feature is off).
    #[error("no AV1 decoder backend available")]
    DecoderUnavailable,

    /// The encoder refused a frame.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The decoder rejected a compressed payload.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Frame dimensions or plane sizes are inconsistent.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, VideoError>;
