//! The storage contract the save core is written against.

use async_trait::async_trait;
use tokio::sync::broadcast;

use savegame_models::{BackupEntry, SaveDescriptor, SaveFileInfo};

use crate::error::Result;

/// Change notifications published by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageNotice {
    /// A slot's payload was written for the first time.
    Created(String),
    /// A slot was removed.
    Deleted(String),
    /// A read or write against the slot failed.
    Error { slot: String, message: String },
}

impl StorageNotice {
    /// The slot this notice concerns.
    pub fn slot(&self) -> &str {
        match self {
            StorageNotice::Created(slot) => slot,
            StorageNotice::Deleted(slot) => slot,
            StorageNotice::Error { slot, .. } => slot,
        }
    }
}

/// Durable byte-level storage of slot payloads, sidecars and backups.
///
/// Implementations own the on-disk layout and the payload encoding; callers
/// only ever pass slot names and opaque bytes.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Reads a slot's payload.
    async fn load_file(&self, slot: &str) -> Result<Vec<u8>>;

    /// Replaces a slot's payload atomically.
    async fn save_file_atomic(&self, slot: &str, bytes: &[u8]) -> Result<()>;

    /// Reads a slot's sidecar, `None` if it has none.
    async fn load_metadata(&self, slot: &str) -> Result<Option<SaveDescriptor>>;

    /// Writes a slot's sidecar.
    async fn save_metadata(&self, slot: &str, descriptor: &SaveDescriptor) -> Result<()>;

    /// Makes sure the slot's storage location exists.
    async fn ensure_slot(&self, slot: &str) -> Result<()>;

    /// True when the slot has a payload.
    fn slot_exists(&self, slot: &str) -> bool;

    /// Cheap file-level integrity check (present, non-empty, decodable).
    fn validate_file_integrity(&self, slot: &str) -> bool;

    /// Names of all slots, excluding reserved directories.
    fn available_save_slots(&self) -> Result<Vec<String>>;

    /// Backups of a slot, oldest first.
    fn available_backups(&self, slot: &str) -> Result<Vec<BackupEntry>>;

    /// Copies the slot's current payload into a new backup. Returns `None`
    /// when there is nothing to back up.
    async fn create_backup(&self, slot: &str) -> Result<Option<BackupEntry>>;

    /// Removes one backup.
    async fn delete_backup(&self, slot: &str, backup_id: &str) -> Result<()>;

    /// Replaces the slot's payload and sidecar with a backup's copy.
    async fn restore_from_backup(&self, slot: &str, backup_id: &str) -> Result<bool>;

    /// File timestamps and integrity of a slot's payload.
    fn save_file_info(&self, slot: &str) -> Result<SaveFileInfo>;

    /// Removes a slot and all of its backups. Returns false if it did not
    /// exist.
    async fn delete_slot(&self, slot: &str) -> Result<bool>;

    /// Subscribes to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StorageNotice>;
}
