//! Error types shared across the Genobank workspace

use thiserror::Error;

/// Result type alias for Genobank operations
pub type Result<T> = std::result::Result<T, GenobankError>;

/// Errors raised by the shared helpers
#[derive(Error, Debug)]
pub enum GenobankError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Unknown matrix format: {0}")]
    UnknownFormat(String),

    #[error("Unknown orientation: {0}")]
    UnknownOrientation(String),

    #[error("Unknown member kind: {0}")]
    UnknownMemberKind(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
