//! File-system backed slot storage.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use savegame_models::{BackupEntry, SaveDescriptor, SaveFileInfo};

use crate::atomic::{atomic_write, atomic_write_json, copy_dir, read_bytes, read_json_optional};
use crate::error::{Result, StorageError};
use crate::service::{StorageNotice, StorageService};

/// Payload file name inside a slot directory.
pub const PAYLOAD_FILE: &str = "save.json";

/// Sidecar file name inside a slot directory.
pub const METADATA_FILE: &str = "save.meta.json";

/// Reserved directory holding every slot's backups.
pub const BACKUPS_DIR: &str = "backups";

const BACKUP_MARKER: &str = "_backup_";
const BACKUP_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
const MAX_SLOT_NAME_LEN: usize = 64;

/// Checks that a slot name is safe to use as a directory name.
pub fn validate_slot_name(slot: &str) -> Result<()> {
    let valid = !slot.is_empty()
        && slot.len() <= MAX_SLOT_NAME_LEN
        && slot
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && slot != BACKUPS_DIR
        && !slot.contains(BACKUP_MARKER);

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidSlotName(slot.to_string()))
    }
}

/// Builds a backup id for a slot at a point in time.
fn backup_id(slot: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}_{:06}",
        slot,
        BACKUP_MARKER,
        at.format(BACKUP_TIME_FORMAT),
        at.timestamp_subsec_micros()
    )
}

/// Parses the creation time out of a backup id belonging to `slot`.
fn parse_backup_id(slot: &str, id: &str) -> Option<DateTime<Utc>> {
    let stamp = id.strip_prefix(slot)?.strip_prefix(BACKUP_MARKER)?;
    let (date_time, micros) = stamp.rsplit_once('_')?;
    let naive = NaiveDateTime::parse_from_str(date_time, BACKUP_TIME_FORMAT).ok()?;
    let micros: i64 = micros.parse().ok()?;
    Some(naive.and_utc() + Duration::microseconds(micros))
}

/// Runs blocking file work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

/// Stores slots as directories under a base path.
///
/// ```text
/// base_path/
/// ├── {slot}/
/// │   ├── save.json
/// │   └── save.meta.json
/// └── backups/
///     └── {slot}_backup_{YYYYmmdd_HHMMSS_micros}/
///         ├── save.json
///         └── save.meta.json
/// ```
pub struct FileStorage {
    base_path: PathBuf,
    notices: broadcast::Sender<StorageNotice>,
}

impl FileStorage {
    /// Creates a new FileStorage rooted at the given path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            base_path: base_path.into(),
            notices,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn slot_dir(&self, slot: &str) -> PathBuf {
        self.base_path.join(slot)
    }

    fn payload_path(&self, slot: &str) -> PathBuf {
        self.slot_dir(slot).join(PAYLOAD_FILE)
    }

    fn metadata_path(&self, slot: &str) -> PathBuf {
        self.slot_dir(slot).join(METADATA_FILE)
    }

    fn backups_root(&self) -> PathBuf {
        self.base_path.join(BACKUPS_DIR)
    }

    fn notify(&self, notice: StorageNotice) {
        // No receivers is fine
        let _ = self.notices.send(notice);
    }

    /// Publishes an error notice for failed I/O before handing the result
    /// back.
    fn report<T>(&self, slot: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if !e.is_not_found() {
                self.notify(StorageNotice::Error {
                    slot: slot.to_string(),
                    message: e.to_string(),
                });
            }
        }
        result
    }
}

#[async_trait]
impl StorageService for FileStorage {
    async fn load_file(&self, slot: &str) -> Result<Vec<u8>> {
        validate_slot_name(slot)?;
        let path = self.payload_path(slot);
        if !path.exists() {
            return Err(StorageError::not_found("save slot", slot));
        }
        let result = blocking(move || read_bytes(&path)).await;
        self.report(slot, result)
    }

    async fn save_file_atomic(&self, slot: &str, bytes: &[u8]) -> Result<()> {
        validate_slot_name(slot)?;
        let path = self.payload_path(slot);
        let existed = path.exists();
        let data = bytes.to_vec();

        let result = blocking(move || atomic_write(&path, &data)).await;
        self.report(slot, result)?;

        if !existed {
            self.notify(StorageNotice::Created(slot.to_string()));
        }
        Ok(())
    }

    async fn load_metadata(&self, slot: &str) -> Result<Option<SaveDescriptor>> {
        validate_slot_name(slot)?;
        let path = self.metadata_path(slot);
        let result = blocking(move || read_json_optional(&path)).await;
        self.report(slot, result)
    }

    async fn save_metadata(&self, slot: &str, descriptor: &SaveDescriptor) -> Result<()> {
        validate_slot_name(slot)?;
        let path = self.metadata_path(slot);
        let descriptor = descriptor.clone();
        let result = blocking(move || atomic_write_json(&path, &descriptor)).await;
        self.report(slot, result)
    }

    async fn ensure_slot(&self, slot: &str) -> Result<()> {
        validate_slot_name(slot)?;
        let dir = self.slot_dir(slot);
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|source| StorageError::DirectoryError { path: dir, source })?;
        }
        Ok(())
    }

    fn slot_exists(&self, slot: &str) -> bool {
        validate_slot_name(slot).is_ok() && self.payload_path(slot).is_file()
    }

    fn validate_file_integrity(&self, slot: &str) -> bool {
        if validate_slot_name(slot).is_err() {
            return false;
        }
        match read_bytes(&self.payload_path(slot)) {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<serde_json::Value>(&bytes)
                .map(|v| v.is_object())
                .unwrap_or(false),
            _ => false,
        }
    }

    fn available_save_slots(&self) -> Result<Vec<String>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.base_path).map_err(|source| StorageError::ReadError {
            path: self.base_path.clone(),
            source,
        })?;

        let mut slots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::ReadError {
                path: self.base_path.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if validate_slot_name(name).is_err() {
                debug!(dir = %name, "skipping non-slot directory");
                continue;
            }
            if path.join(PAYLOAD_FILE).is_file() {
                slots.push(name.to_string());
            }
        }

        slots.sort();
        Ok(slots)
    }

    fn available_backups(&self, slot: &str) -> Result<Vec<BackupEntry>> {
        validate_slot_name(slot)?;
        let root = self.backups_root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&root).map_err(|source| StorageError::ReadError {
            path: root.clone(),
            source,
        })?;

        let mut backups = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(id) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if let Some(created_at) = parse_backup_id(slot, &id) {
                backups.push(BackupEntry {
                    id,
                    slot_name: slot.to_string(),
                    created_at,
                    path,
                });
            }
        }

        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(backups)
    }

    async fn create_backup(&self, slot: &str) -> Result<Option<BackupEntry>> {
        validate_slot_name(slot)?;
        if !self.payload_path(slot).is_file() {
            return Ok(None);
        }

        // Strictly later than every existing backup so FIFO order is stable
        let mut created_at = Utc::now();
        if let Some(latest) = self.available_backups(slot)?.last() {
            if created_at <= latest.created_at {
                created_at = latest.created_at + Duration::microseconds(1);
            }
        }
        let root = self.backups_root();
        let mut id = backup_id(slot, created_at);
        while root.join(&id).exists() {
            created_at += Duration::microseconds(1);
            id = backup_id(slot, created_at);
        }

        let dir = root.join(&id);
        let source = self.slot_dir(slot);
        let target = dir.clone();
        let result = blocking(move || copy_dir(&source, &target)).await;
        self.report(slot, result)?;

        debug!(slot = %slot, backup = %id, "backup created");
        Ok(Some(BackupEntry {
            id,
            slot_name: slot.to_string(),
            created_at,
            path: dir,
        }))
    }

    async fn delete_backup(&self, slot: &str, backup_id: &str) -> Result<()> {
        validate_slot_name(slot)?;
        if parse_backup_id(slot, backup_id).is_none() {
            return Err(StorageError::not_found("backup", backup_id));
        }
        let dir = self.backups_root().join(backup_id);
        if !dir.exists() {
            return Err(StorageError::not_found("backup", backup_id));
        }
        let result = blocking(move || {
            fs::remove_dir_all(&dir).map_err(|source| StorageError::WriteError { path: dir, source })
        })
        .await;
        self.report(slot, result)
    }

    async fn restore_from_backup(&self, slot: &str, backup_id: &str) -> Result<bool> {
        validate_slot_name(slot)?;
        if parse_backup_id(slot, backup_id).is_none() {
            return Ok(false);
        }
        let dir = self.backups_root().join(backup_id);
        let backup_payload = dir.join(PAYLOAD_FILE);
        if !backup_payload.is_file() {
            warn!(slot = %slot, backup = %backup_id, "backup has no payload");
            return Ok(false);
        }

        let payload = self.payload_path(slot);
        let metadata = self.metadata_path(slot);
        let backup_metadata = dir.join(METADATA_FILE);
        let result = blocking(move || {
            let bytes = read_bytes(&backup_payload)?;
            atomic_write(&payload, &bytes)?;
            if backup_metadata.is_file() {
                let meta = read_bytes(&backup_metadata)?;
                atomic_write(&metadata, &meta)?;
            }
            Ok(())
        })
        .await;
        self.report(slot, result)?;

        debug!(slot = %slot, backup = %backup_id, "slot restored from backup");
        Ok(true)
    }

    fn save_file_info(&self, slot: &str) -> Result<SaveFileInfo> {
        validate_slot_name(slot)?;
        let path = self.payload_path(slot);
        if !path.is_file() {
            return Err(StorageError::not_found("save slot", slot));
        }
        let meta = fs::metadata(&path).map_err(|source| StorageError::ReadError {
            path: path.clone(),
            source,
        })?;

        let last_write_at: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        // Not every filesystem records birth time
        let created_at: DateTime<Utc> = meta.created().map(DateTime::from).unwrap_or(last_write_at);

        Ok(SaveFileInfo {
            created_at,
            last_write_at,
            is_valid: self.validate_file_integrity(slot),
            size_bytes: meta.len(),
        })
    }

    async fn delete_slot(&self, slot: &str) -> Result<bool> {
        validate_slot_name(slot)?;
        let dir = self.slot_dir(slot);
        let existed = dir.exists();
        let backups: Vec<PathBuf> = self
            .available_backups(slot)?
            .into_iter()
            .map(|b| b.path)
            .collect();

        let result = blocking(move || {
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .map_err(|source| StorageError::WriteError { path: dir.clone(), source })?;
            }
            for path in backups {
                fs::remove_dir_all(&path)
                    .map_err(|source| StorageError::WriteError { path, source })?;
            }
            Ok(())
        })
        .await;
        self.report(slot, result)?;

        if existed {
            self.notify(StorageNotice::Deleted(slot.to_string()));
        }
        Ok(existed)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageNotice> {
        self.notices.subscribe()
    }
}
