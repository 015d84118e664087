//! Ingestion error types
//!
//! Validation findings in a matrix file are not errors in this sense: they are
//! collected as [`StatusEntry`](crate::genotype::outcome::StatusEntry) values.
//! `IngestError` covers the failures that stop a step outright.

use thiserror::Error;

use crate::genotype::outcome::StatusKind;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] genobank_common::GenobankError),

    #[error("Matrix codec failed: {0}")]
    Codec(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Status kind used when this error is folded into a job outcome
    pub fn status_kind(&self) -> StatusKind {
        match self {
            IngestError::Io(_) | IngestError::Staging(_) => StatusKind::Io,
            IngestError::Database(_) | IngestError::Migration(_) | IngestError::NotFound(_) => {
                StatusKind::Database
            },
            IngestError::Codec(_) => StatusKind::Codec,
            IngestError::Validation(_) => StatusKind::Validation,
            IngestError::Serialization(_)
            | IngestError::Common(_)
            | IngestError::Config(_)
            | IngestError::Internal(_) => StatusKind::Internal,
        }
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Internal(format!("background task did not complete: {err}"))
    }
}
