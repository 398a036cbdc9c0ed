//! Slot storage for save games.
//!
//! This crate provides:
//! - The [`StorageService`] contract the save core is written against
//! - [`FileStorage`], a directory-per-slot implementation with atomic
//!   writes, timestamped backups and change notifications
//! - Small crash-safe file helpers
//!
//! # Storage Layout
//!
//! ```text
//! ~/.savegame/slots/
//! ├── quicksave/
//! │   ├── save.json          # full record
//! │   └── save.meta.json     # descriptor sidecar
//! ├── career/
//! │   └── ...
//! └── backups/
//!     ├── quicksave_backup_20260101_120000_000001/
//!     └── career_backup_20260102_093000_500000/
//! ```

pub mod atomic;
pub mod error;
pub mod file_storage;
pub mod service;

pub use atomic::{atomic_write, atomic_write_json};
pub use error::{Result, StorageError};
pub use file_storage::{validate_slot_name, FileStorage, BACKUPS_DIR, METADATA_FILE, PAYLOAD_FILE};
pub use service::{StorageNotice, StorageService};
