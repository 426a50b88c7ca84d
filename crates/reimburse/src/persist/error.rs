//! Persistence errors.

use thiserror::Error;

use super::native::{DeserializeError, SerializeError};

/// Errors raised while reading an artifact.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Binary(#[from] DeserializeError),

    #[error("format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The artifact parsed but violates a structural invariant.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Errors raised while writing an artifact.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Binary(#[from] SerializeError),
}
