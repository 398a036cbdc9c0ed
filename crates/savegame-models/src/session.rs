//! In-flight save and load sessions.
//!
//! Sessions are transient: they exist only while an operation runs and are
//! never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a load materializes the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Decode everything up front.
    #[default]
    Full,
    /// Decode, then drop the large instance collections until hydrated.
    Lazy,
    /// Staged loader; loads core data and then falls back to `Full`.
    Streaming,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStrategy::Full => "full",
            LoadStrategy::Lazy => "lazy",
            LoadStrategy::Streaming => "streaming",
        };
        f.write_str(s)
    }
}

/// Phase of the load pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadOperation {
    #[default]
    None,
    Initializing,
    Validating,
    CheckingCompatibility,
    MigratingVersion,
    LoadingData,
    LoadingCoreData,
    ValidatingData,
    SanitizingData,
    FinalValidation,
    ApplyingData,
    Completed,
    Cancelled,
}

impl LoadOperation {
    /// True for every state between `None` and a terminal state.
    pub fn is_in_progress(self) -> bool {
        !matches!(
            self,
            LoadOperation::None | LoadOperation::Completed | LoadOperation::Cancelled
        )
    }

    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(self, next: LoadOperation) -> bool {
        use LoadOperation::*;

        if self.is_in_progress() && matches!(next, Cancelled | None) {
            return true;
        }

        matches!(
            (self, next),
            (None, Initializing)
                | (Initializing, Validating)
                | (Initializing, CheckingCompatibility)
                | (Validating, CheckingCompatibility)
                | (CheckingCompatibility, MigratingVersion)
                | (CheckingCompatibility, LoadingData)
                | (MigratingVersion, LoadingData)
                | (LoadingData, LoadingCoreData)
                | (LoadingData, ValidatingData)
                | (LoadingCoreData, ValidatingData)
                | (ValidatingData, SanitizingData)
                | (ValidatingData, FinalValidation)
                | (SanitizingData, FinalValidation)
                | (FinalValidation, ApplyingData)
                | (ApplyingData, Completed)
                | (Completed, None)
                | (Cancelled, None)
        )
    }
}

/// Phase of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SavePhase {
    #[default]
    Preparing,
    EnsuringSlot,
    BackingUp,
    Writing,
    Complete,
}

/// Error taxonomy shared by events and crate errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Integrity,
    Concurrency,
    VersionMismatch,
    Io,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Integrity => "integrity",
            FailureKind::Concurrency => "concurrency",
            FailureKind::VersionMismatch => "version_mismatch",
            FailureKind::Io => "io",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Application lifecycle signals forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    Paused,
    Resumed,
    FocusLost,
    FocusGained,
}

/// State of the in-flight save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSession {
    pub id: u64,
    pub slot_name: String,
    pub phase: SavePhase,
    pub progress: f32,
    pub started_at: DateTime<Utc>,
}

impl SaveSession {
    pub fn new(id: u64, slot_name: impl Into<String>) -> Self {
        Self {
            id,
            slot_name: slot_name.into(),
            phase: SavePhase::Preparing,
            progress: 0.0,
            started_at: Utc::now(),
        }
    }
}

/// State of the in-flight load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSession {
    pub id: u64,
    pub slot_name: String,
    pub strategy: LoadStrategy,
    pub operation: LoadOperation,
    pub progress: f32,
    pub retry_count: u32,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
}

impl LoadSession {
    pub fn new(id: u64, slot_name: impl Into<String>, strategy: LoadStrategy) -> Self {
        Self {
            id,
            slot_name: slot_name.into(),
            strategy,
            operation: LoadOperation::None,
            progress: 0.0,
            retry_count: 0,
            cancelled: false,
            started_at: Utc::now(),
        }
    }
}
