//! Error types for lumagrade.

use thiserror::Error;

/// Main error type for lumagrade operations.
#[derive(Error, Debug)]
pub enum LumaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("GPU context lost")]
    ContextLost,

    #[error("Invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for lumagrade operations.
pub type Result<T> = std::result::Result<T, LumaError>;
