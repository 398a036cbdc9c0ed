//! Error types for slot storage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing slots.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Slot, payload or backup does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Slot name is empty, reserved, or contains unsupported characters.
    #[error("invalid slot name: {0:?}")]
    InvalidSlotName(String),

    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking file task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub(crate) fn not_found(kind: &str, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
