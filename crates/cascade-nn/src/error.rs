//! Error types for cascade-nn.

use thiserror::Error;

/// cascade-nn error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Error raised by the graph/sampling layer.
    #[error(transparent)]
    Core(#[from] cascade_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Checkpoint is missing a parameter or has the wrong shape.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
