//! Save engine for the savegame workspace.
//!
//! This crate provides:
//! - [`SaveManager`]: the single writer of slots (backup-then-overwrite,
//!   sidecar rollback, forward migration on read, slot management)
//! - [`OperationSessions`]: the one-save/one-load session guards
//! - [`AutoSaveScheduler`] and [`SaveRuntime`] for interval and shutdown
//!   saves
//! - [`SaveConfig`] with environment and file overrides

pub mod autosave;
pub mod config;
pub mod engine;
pub mod error;
pub mod runtime;
pub mod sessions;

pub use autosave::AutoSaveScheduler;
pub use config::{default_save_root, SaveConfig, SAVE_DIR_ENV};
pub use engine::SaveManager;
pub use error::{ConfigError, Result, RuntimeError, SaveError};
pub use runtime::SaveRuntime;
pub use sessions::{LoadGuard, OperationSessions, SaveGuard};
