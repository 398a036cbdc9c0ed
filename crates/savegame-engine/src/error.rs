//! Error types for the engine crate.

use std::path::PathBuf;

use thiserror::Error;

use savegame_models::{FailureKind, LoadOperation};
use savegame_persistence::StorageError;

/// Errors that can occur while saving or loading a slot.
#[derive(Debug, Error)]
pub enum SaveError {
    /// Slot has no payload.
    #[error("save slot not found: {0}")]
    NotFound(String),

    /// Payload is undecodable, fails its checksum or is critically invalid.
    #[error("save slot {slot} failed integrity check: {reason}")]
    Integrity { slot: String, reason: String },

    /// Another operation of the same kind is in flight.
    #[error("operation already in progress: {0}")]
    Concurrency(String),

    /// Stored version is newer than this build or cannot be migrated.
    #[error("version mismatch for {slot}: found {found}, expected {expected}")]
    VersionMismatch {
        slot: String,
        found: String,
        expected: String,
    },

    /// Creating another slot would exceed the configured maximum.
    #[error("maximum save slots reached: {0}")]
    SlotLimitReached(usize),

    /// The record cannot be written as it is.
    #[error("record cannot be saved: {0}")]
    InvalidRecord(String),

    /// Load state moved along an edge the state machine does not allow.
    #[error("invalid load transition: {from:?} -> {to:?}")]
    InvalidTransition { from: LoadOperation, to: LoadOperation },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SaveError {
    /// Failure category reported in events.
    pub fn kind(&self) -> FailureKind {
        match self {
            SaveError::NotFound(_) => FailureKind::NotFound,
            SaveError::Integrity { .. }
            | SaveError::InvalidRecord(_)
            | SaveError::Serialization(_) => FailureKind::Integrity,
            SaveError::Concurrency(_) | SaveError::InvalidTransition { .. } => {
                FailureKind::Concurrency
            }
            SaveError::VersionMismatch { .. } => FailureKind::VersionMismatch,
            SaveError::Cancelled => FailureKind::Cancelled,
            SaveError::Storage(e) if e.is_not_found() => FailureKind::NotFound,
            SaveError::SlotLimitReached(_) | SaveError::Storage(_) => FailureKind::Io,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind(), FailureKind::NotFound | FailureKind::Cancelled)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SaveError>;

/// Errors reading a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors starting or stopping the save runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Runtime not started.
    #[error("runtime not started")]
    NotStarted,

    /// Runtime already started.
    #[error("runtime already started")]
    AlreadyStarted,

    /// Shutdown error.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}
