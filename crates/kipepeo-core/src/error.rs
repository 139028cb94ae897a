//! Centralized error types for the kipepeo runtime.
//!
//! Uses thiserror for ergonomic error handling with context.

use thiserror::Error;

/// Main error type for cross-crate kipepeo operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KipepeoError {
    /// Invalid runtime configuration detected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A model registry entry references a size class that was never registered.
    #[error("Model size not registered: {0}")]
    ModelNotRegistered(String),

    /// The hardware probe could not read a required OS source.
    #[error("Hardware probe failed: {0}")]
    ProbeFailed(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, KipepeoError>;
