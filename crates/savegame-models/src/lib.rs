//! Core data models for the save system.
//!
//! This crate provides the types shared by the persistence, validation,
//! engine and loader crates: the full [`SaveRecord`], its sidecar
//! [`SaveDescriptor`], backup entries, validation results, schema versions
//! and the transient save/load sessions.

pub mod builders;
pub mod descriptor;
pub mod record;
pub mod session;
pub mod validation;
pub mod version;

// Re-export main types
pub use builders::RecordBuilder;
pub use descriptor::{sort_by_last_modified, BackupEntry, SaveDescriptor, SaveFileInfo, SlotInfo};
pub use record::{GameSettings, GameState, PlayerProgress, SaveRecord, SETTINGS_SCHEMA_VERSION};
pub use session::{
    FailureKind, LifecycleSignal, LoadOperation, LoadSession, LoadStrategy, SavePhase, SaveSession,
};
pub use validation::{Severity, ValidationIssue, ValidationResult};
pub use version::{compatibility, Compatibility, SaveVersion, CURRENT_SAVE_VERSION, UNKNOWN_VERSION};
