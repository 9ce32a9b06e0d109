//! Error types for sqlmux

use thiserror::Error;

/// Core error type for sqlmux operations
#[derive(Error, Debug)]
pub enum SqlmuxError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported parameter shape {shape} on descriptor {descriptor}")]
    UnsupportedParameterShape {
        shape: &'static str,
        descriptor: String,
    },

    #[error("No command captured for descriptor {descriptor}: {reason}")]
    CaptureFailed { descriptor: String, reason: String },

    #[error("Batch produced {received} result sets, expected {expected}")]
    ResultSetCountMismatch { expected: usize, received: usize },

    #[error("Expected {expected} row(s), result set has {actual}")]
    RowCount {
        expected: &'static str,
        actual: usize,
    },

    #[error("Result position {position} out of range for batch of {len}")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("Sequential result cursor exhausted after {len} result sets")]
    ResultsExhausted { len: usize },

    #[error("Result slot holds {actual}, not {requested}")]
    ResultTypeMismatch { requested: String, actual: String },

    #[error("No result registered for type {0}")]
    NotRegistered(String),

    #[error("Row decode error: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Result type alias for sqlmux operations
pub type Result<T> = std::result::Result<T, SqlmuxError>;
