use thiserror::Error;

/// Errors that can occur in cascade-core.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// A field could not be parsed as an index.
    #[error("parse error: {0}")]
    Parse(String),
    /// A user or item index is outside the declared range.
    #[error("{kind} index {index} out of range (bound {bound})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        bound: usize,
    },
    /// A sampling pool is too small to draw the requested items from.
    #[error("insufficient {kind} candidates for user {user}: needed {needed}, available {available}")]
    InsufficientCandidates {
        user: usize,
        kind: &'static str,
        needed: usize,
        available: usize,
    },
    /// Graphs or label rows disagree on shape.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias for cascade-core.
pub type Result<T> = std::result::Result<T, Error>;
