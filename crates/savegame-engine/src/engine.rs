//! The save engine: the single writer of slots.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use savegame_events::{LoadEvent, SaveEvent, SaveEvents};
use savegame_models::{
    compatibility, sort_by_last_modified, BackupEntry, Compatibility, LifecycleSignal,
    LoadStrategy, SaveDescriptor, SavePhase, SaveRecord, SlotInfo,
};
use savegame_persistence::{validate_slot_name, StorageService};
use savegame_validation::ValidatorService;

use crate::config::SaveConfig;
use crate::error::{Result, SaveError};
use crate::sessions::{OperationSessions, SaveGuard};

/// The slot and record the game is currently playing.
#[derive(Debug, Clone)]
struct CurrentSave {
    slot: String,
    record: SaveRecord,
}

/// How to undo a payload write whose sidecar failed.
enum Rollback {
    Backup(BackupEntry),
    Payload(Vec<u8>),
    Remove,
}

/// Turns in-memory records into durable slots and back.
///
/// All writes to storage go through one async write lock. Public
/// operations never return errors: failures are logged, published as
/// events and reported as `false`/`None`.
pub struct SaveManager {
    config: SaveConfig,
    storage: Arc<dyn StorageService>,
    validator: Arc<dyn ValidatorService>,
    events: Arc<SaveEvents>,
    sessions: OperationSessions,
    write_lock: Mutex<()>,
    current: RwLock<Option<CurrentSave>>,
}

impl SaveManager {
    /// Creates a save manager with its own event buses.
    pub fn new(
        config: SaveConfig,
        storage: Arc<dyn StorageService>,
        validator: Arc<dyn ValidatorService>,
    ) -> Self {
        Self {
            config,
            storage,
            validator,
            events: Arc::new(SaveEvents::new()),
            sessions: OperationSessions::new(),
            write_lock: Mutex::new(()),
            current: RwLock::new(None),
        }
    }

    /// Publishes on shared event buses instead of private ones.
    pub fn with_events(mut self, events: Arc<SaveEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn StorageService> {
        Arc::clone(&self.storage)
    }

    pub fn validator(&self) -> Arc<dyn ValidatorService> {
        Arc::clone(&self.validator)
    }

    pub fn events(&self) -> Arc<SaveEvents> {
        Arc::clone(&self.events)
    }

    pub fn sessions(&self) -> &OperationSessions {
        &self.sessions
    }

    /// Slot of the record currently in play.
    pub fn current_slot(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.slot.clone())
    }

    /// The record currently in play.
    pub fn current_record(&self) -> Option<SaveRecord> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.record.clone())
    }

    /// Makes `record` the one in play for `slot`.
    pub fn apply_loaded(&self, slot: &str, record: SaveRecord) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(CurrentSave {
            slot: slot.to_string(),
            record,
        });
    }

    /// Like [`apply_loaded`](Self::apply_loaded), returning what was in play.
    pub fn replace_current(&self, slot: &str, record: SaveRecord) -> Option<(String, SaveRecord)> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = current.replace(CurrentSave {
            slot: slot.to_string(),
            record,
        });
        previous.map(|c| (c.slot, c.record))
    }

    /// Puts back what [`replace_current`](Self::replace_current) returned.
    pub fn reinstate_current(&self, previous: Option<(String, SaveRecord)>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            previous.map(|(slot, record)| CurrentSave { slot, record });
    }

    fn clear_current_if(&self, slot: &str) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().map(|c| c.slot.as_str()) == Some(slot) {
            *current = None;
        }
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Saves `record` (or the current record) into `slot`.
    ///
    /// Returns false if another save is in flight or anything fails.
    pub async fn save_game(&self, slot: &str, record: Option<SaveRecord>) -> bool {
        let Some(guard) = self.sessions.try_begin_save(slot) else {
            warn!(slot = %slot, "save rejected, another save is in progress");
            self.publish_save_error(slot, &SaveError::Concurrency("save".into()));
            return false;
        };

        self.events.save.publish(&SaveEvent::Started {
            slot: slot.to_string(),
        });

        match self.run_save(&guard, slot, record).await {
            Ok(()) => {
                info!(slot = %slot, "game saved");
                self.events.save.publish(&SaveEvent::Completed {
                    slot: slot.to_string(),
                });
                true
            }
            Err(e) => {
                error!(slot = %slot, error = %e, "save failed");
                self.publish_save_error(slot, &e);
                false
            }
        }
    }

    async fn run_save(
        &self,
        guard: &SaveGuard<'_>,
        slot: &str,
        record: Option<SaveRecord>,
    ) -> Result<()> {
        validate_slot_name(slot)?;

        let mut record = match record {
            Some(record) => record,
            None => self
                .current_record()
                .ok_or_else(|| SaveError::InvalidRecord("no record in play".into()))?,
        };
        if record.has_deferred_data() {
            return Err(SaveError::InvalidRecord(
                "lazy-loaded collections must be hydrated first".into(),
            ));
        }
        if !record.play_time_hours.is_finite() {
            return Err(SaveError::InvalidRecord("play time is not finite".into()));
        }

        let _write = self.write_lock.lock().await;

        if !self.storage.slot_exists(slot) {
            let count = self.storage.available_save_slots()?.len();
            if count >= self.config.max_save_slots {
                return Err(SaveError::SlotLimitReached(self.config.max_save_slots));
            }
        }

        record.stamp(slot, &self.config.running_version, Utc::now());
        self.report_progress(Some(guard), slot, SavePhase::Preparing, 0.2);

        self.write_slot(slot, &record, Some(guard)).await?;

        self.apply_loaded(slot, record);
        self.report_progress(Some(guard), slot, SavePhase::Complete, 1.0);
        Ok(())
    }

    /// Backs up the slot, then writes payload and sidecar.
    ///
    /// Callers hold the write lock. A sidecar failure puts the previous
    /// payload back, from the backup taken here or from the bytes read
    /// before the overwrite.
    async fn write_slot(
        &self,
        slot: &str,
        record: &SaveRecord,
        guard: Option<&SaveGuard<'_>>,
    ) -> Result<()> {
        self.storage.ensure_slot(slot).await?;
        self.report_progress(guard, slot, SavePhase::EnsuringSlot, 0.4);

        let backup = if self.config.backups_enabled && self.storage.slot_exists(slot) {
            self.backup_slot(slot).await
        } else {
            None
        };
        let rollback = match backup {
            Some(backup) => Rollback::Backup(backup),
            None if self.storage.slot_exists(slot) => {
                Rollback::Payload(self.storage.load_file(slot).await?)
            }
            None => Rollback::Remove,
        };
        self.report_progress(guard, slot, SavePhase::BackingUp, 0.6);

        let bytes = record.to_bytes()?;
        self.storage.save_file_atomic(slot, &bytes).await?;

        let descriptor = SaveDescriptor::from_record(record);
        if let Err(e) = self.storage.save_metadata(slot, &descriptor).await {
            self.roll_back(slot, rollback).await;
            return Err(e.into());
        }
        self.report_progress(guard, slot, SavePhase::Writing, 0.9);

        debug!(slot = %slot, bytes = bytes.len(), "slot written");
        Ok(())
    }

    /// Takes a backup and prunes old ones. Failures only cost the backup.
    async fn backup_slot(&self, slot: &str) -> Option<BackupEntry> {
        match self.storage.create_backup(slot).await {
            Ok(Some(backup)) => {
                debug!(slot = %slot, backup = %backup.id, "backup created");
                self.prune_backups(slot).await;
                Some(backup)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(slot = %slot, error = %e, "backup failed, saving without one");
                None
            }
        }
    }

    async fn prune_backups(&self, slot: &str) {
        let backups = match self.storage.available_backups(slot) {
            Ok(backups) => backups,
            Err(e) => {
                warn!(slot = %slot, error = %e, "could not list backups for pruning");
                return;
            }
        };

        let excess = backups.len().saturating_sub(self.config.max_backups);
        for backup in backups.iter().take(excess) {
            match self.storage.delete_backup(slot, &backup.id).await {
                Ok(()) => debug!(slot = %slot, backup = %backup.id, "old backup pruned"),
                Err(e) => warn!(slot = %slot, backup = %backup.id, error = %e, "failed to prune backup"),
            }
        }
    }

    async fn roll_back(&self, slot: &str, rollback: Rollback) {
        match rollback {
            Rollback::Backup(backup) => {
                match self.storage.restore_from_backup(slot, &backup.id).await {
                    Ok(true) => warn!(slot = %slot, backup = %backup.id, "payload rolled back"),
                    Ok(false) => error!(slot = %slot, backup = %backup.id, "rollback backup missing"),
                    Err(e) => error!(slot = %slot, error = %e, "rollback failed"),
                }
            }
            Rollback::Payload(bytes) => match self.storage.save_file_atomic(slot, &bytes).await {
                Ok(()) => warn!(slot = %slot, "payload rolled back"),
                Err(e) => error!(slot = %slot, error = %e, "rollback failed"),
            },
            Rollback::Remove => {
                if let Err(e) = self.storage.delete_slot(slot).await {
                    error!(slot = %slot, error = %e, "failed to remove half-written slot");
                }
            }
        }
    }

    fn report_progress(
        &self,
        guard: Option<&SaveGuard<'_>>,
        slot: &str,
        phase: SavePhase,
        progress: f32,
    ) {
        if let Some(guard) = guard {
            guard.set_phase(phase, progress);
            self.events.save.publish(&SaveEvent::Progress {
                slot: slot.to_string(),
                progress,
                phase,
            });
        }
    }

    fn publish_save_error(&self, slot: &str, e: &SaveError) {
        self.events.save.publish(&SaveEvent::Error {
            slot: slot.to_string(),
            message: e.to_string(),
            kind: e.kind(),
        });
    }

    /// Saves the record in play back into its slot.
    pub async fn quick_save(&self, reason: &str) -> bool {
        let Some(slot) = self.current_slot() else {
            warn!(reason = %reason, "quick save skipped, no slot in play");
            return false;
        };
        debug!(slot = %slot, reason = %reason, "quick save");
        self.save_game(&slot, None).await
    }

    /// Spawns a quick save when autosave is on and nothing is in flight.
    pub fn trigger_auto_save(self: &Arc<Self>, reason: &str) -> Option<JoinHandle<bool>> {
        if !self.config.autosave_enabled {
            debug!(reason = %reason, "autosave disabled");
            return None;
        }
        if self.sessions.is_busy() {
            debug!(reason = %reason, "autosave skipped, operation in flight");
            return None;
        }
        if self.current_slot().is_none() {
            debug!(reason = %reason, "autosave skipped, no slot in play");
            return None;
        }

        let engine = Arc::clone(self);
        let reason = reason.to_string();
        Some(tokio::spawn(async move { engine.quick_save(&reason).await }))
    }

    /// Autosaves when the host loses the foreground.
    pub fn handle_lifecycle(self: &Arc<Self>, signal: LifecycleSignal) -> Option<JoinHandle<bool>> {
        match signal {
            LifecycleSignal::Paused => self.trigger_auto_save("paused"),
            LifecycleSignal::FocusLost => self.trigger_auto_save("focus_lost"),
            LifecycleSignal::Resumed | LifecycleSignal::FocusGained => None,
        }
    }

    /// Best-effort save on the way out, bounded by the shutdown timeout.
    pub async fn shutdown_save(&self) -> bool {
        if self.current_slot().is_none() {
            return false;
        }
        match tokio::time::timeout(self.config.shutdown_save_timeout, self.quick_save("shutdown")).await {
            Ok(saved) => saved,
            Err(_) => {
                warn!(
                    timeout_ms = self.config.shutdown_save_timeout.as_millis() as u64,
                    "shutdown save timed out"
                );
                false
            }
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads a slot and makes it the one in play.
    pub async fn load_game(&self, slot: &str) -> Option<SaveRecord> {
        let Some(_guard) = self.sessions.try_begin_load(slot, LoadStrategy::Full) else {
            warn!(slot = %slot, "load rejected, another load is in progress");
            self.publish_load_failure(slot, &SaveError::Concurrency("load".into()));
            return None;
        };

        self.events.load.publish(&LoadEvent::Started {
            slot: slot.to_string(),
            strategy: LoadStrategy::Full,
        });

        match self.read_record(slot).await {
            Ok(record) => {
                self.apply_loaded(slot, record.clone());
                info!(slot = %slot, "game loaded");
                self.events.load.publish(&LoadEvent::Completed {
                    slot: slot.to_string(),
                });
                Some(record)
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "load failed");
                self.publish_load_failure(slot, &e);
                None
            }
        }
    }

    fn publish_load_failure(&self, slot: &str, e: &SaveError) {
        self.events.load.publish(&LoadEvent::Failed {
            slot: slot.to_string(),
            message: e.to_string(),
            kind: e.kind(),
        });
    }

    /// Reads and checks a slot without sessions or events.
    ///
    /// Older records are migrated forward and re-persisted in place.
    pub async fn read_record(&self, slot: &str) -> Result<SaveRecord> {
        let record = self.read_verified(slot).await?;

        let record = match compatibility(&record.save_version, &self.config.running_version) {
            Compatibility::Current => record,
            Compatibility::NeedsMigration => self.migrate_record(slot, record).await?,
            Compatibility::Newer | Compatibility::Unknown => {
                return Err(self.version_mismatch(slot, &record.save_version));
            }
        };

        let result = self.validator.validate(&record);
        if result.is_critical() {
            return Err(SaveError::Integrity {
                slot: slot.to_string(),
                reason: result.summary(),
            });
        }
        Ok(record)
    }

    /// Migrates an on-disk slot to the running version.
    pub async fn migrate_slot(&self, slot: &str) -> Result<SaveRecord> {
        let record = self.read_verified(slot).await?;
        match compatibility(&record.save_version, &self.config.running_version) {
            Compatibility::Current => Ok(record),
            Compatibility::NeedsMigration => self.migrate_record(slot, record).await,
            Compatibility::Newer | Compatibility::Unknown => {
                Err(self.version_mismatch(slot, &record.save_version))
            }
        }
    }

    /// Decodes a payload and checks its checksum.
    async fn read_verified(&self, slot: &str) -> Result<SaveRecord> {
        validate_slot_name(slot)?;
        let bytes = match self.storage.load_file(slot).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Err(SaveError::NotFound(slot.to_string())),
            Err(e) => return Err(e.into()),
        };

        let record = SaveRecord::from_bytes(&bytes).map_err(|e| SaveError::Integrity {
            slot: slot.to_string(),
            reason: format!("undecodable payload: {}", e),
        })?;

        if !record.verify_checksum() {
            return Err(SaveError::Integrity {
                slot: slot.to_string(),
                reason: "checksum mismatch".into(),
            });
        }
        Ok(record)
    }

    async fn migrate_record(&self, slot: &str, record: SaveRecord) -> Result<SaveRecord> {
        let found = record.save_version.clone();
        let target = self.config.running_version.clone();

        let mut migrated = self
            .validator
            .migrate(record, &target)
            .ok_or_else(|| self.version_mismatch(slot, &found))?;
        migrated.stamp(slot, &target, Utc::now());

        {
            let _write = self.write_lock.lock().await;
            self.write_slot(slot, &migrated, None).await?;
        }

        info!(slot = %slot, from = %found, to = %target, "save migrated");
        Ok(migrated)
    }

    fn version_mismatch(&self, slot: &str, found: &str) -> SaveError {
        SaveError::VersionMismatch {
            slot: slot.to_string(),
            found: found.to_string(),
            expected: self.config.running_version.clone(),
        }
    }

    /// Loads the slot in play again from disk.
    pub async fn quick_load(&self) -> Option<SaveRecord> {
        let Some(slot) = self.current_slot() else {
            warn!("quick load skipped, no slot in play");
            return None;
        };
        self.load_game(&slot).await
    }

    // =========================================================================
    // Slot management
    // =========================================================================

    /// Descriptors of every slot, newest first.
    ///
    /// Slots whose sidecar cannot be read are skipped.
    pub async fn get_save_slots(&self) -> Vec<SaveDescriptor> {
        let slots = match self.storage.available_save_slots() {
            Ok(slots) => slots,
            Err(e) => {
                warn!(error = %e, "failed to enumerate slots");
                return Vec::new();
            }
        };

        let mut descriptors = Vec::with_capacity(slots.len());
        for slot in slots {
            match self.storage.load_metadata(&slot).await {
                Ok(Some(descriptor)) => descriptors.push(descriptor),
                Ok(None) => warn!(slot = %slot, "slot has no sidecar, skipping"),
                Err(e) => warn!(slot = %slot, error = %e, "unreadable sidecar, skipping"),
            }
        }

        sort_by_last_modified(&mut descriptors);
        descriptors
    }

    /// Descriptor, integrity and size of one slot.
    pub async fn get_save_slot_info(&self, slot: &str) -> Option<SlotInfo> {
        if !self.storage.slot_exists(slot) {
            return None;
        }

        let file = match self.storage.save_file_info(slot) {
            Ok(info) => info,
            Err(e) => {
                warn!(slot = %slot, error = %e, "failed to stat slot");
                return None;
            }
        };

        let descriptor = match self.storage.load_metadata(slot).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => SaveDescriptor::minimal(slot, file.created_at, file.last_write_at),
            Err(e) => {
                warn!(slot = %slot, error = %e, "unreadable sidecar");
                SaveDescriptor::minimal(slot, file.created_at, file.last_write_at)
            }
        };

        Some(SlotInfo {
            descriptor,
            is_valid: file.is_valid,
            size_bytes: file.size_bytes,
        })
    }

    /// Removes a slot and its backups.
    pub async fn delete_save_slot(&self, slot: &str) -> bool {
        let _write = self.write_lock.lock().await;
        match self.storage.delete_slot(slot).await {
            Ok(true) => {
                self.clear_current_if(slot);
                info!(slot = %slot, "slot deleted");
                true
            }
            Ok(false) => {
                debug!(slot = %slot, "slot to delete does not exist");
                false
            }
            Err(e) => {
                error!(slot = %slot, error = %e, "failed to delete slot");
                false
            }
        }
    }

    /// Backups of a slot, oldest first.
    pub fn list_backups(&self, slot: &str) -> Vec<BackupEntry> {
        self.storage.available_backups(slot).unwrap_or_else(|e| {
            warn!(slot = %slot, error = %e, "failed to list backups");
            Vec::new()
        })
    }

    /// Replaces a slot with one of its backups.
    pub async fn restore_backup(&self, slot: &str, backup_id: &str) -> bool {
        let _write = self.write_lock.lock().await;
        match self.storage.restore_from_backup(slot, backup_id).await {
            Ok(true) => {
                // The record in play no longer matches the disk
                self.clear_current_if(slot);
                info!(slot = %slot, backup = %backup_id, "slot restored from backup");
                true
            }
            Ok(false) => {
                warn!(slot = %slot, backup = %backup_id, "backup not found");
                false
            }
            Err(e) => {
                error!(slot = %slot, backup = %backup_id, error = %e, "restore failed");
                false
            }
        }
    }

    /// Puts the newest backup back in place, leaving the record in play alone.
    ///
    /// Used by load recovery; returns the backup that was restored.
    pub async fn restore_latest_backup(&self, slot: &str) -> Option<BackupEntry> {
        let _write = self.write_lock.lock().await;
        let newest = self.list_backups(slot).pop()?;
        match self.storage.restore_from_backup(slot, &newest.id).await {
            Ok(true) => {
                info!(slot = %slot, backup = %newest.id, "slot recovered from latest backup");
                Some(newest)
            }
            Ok(false) => None,
            Err(e) => {
                error!(slot = %slot, backup = %newest.id, error = %e, "recovery restore failed");
                None
            }
        }
    }
}
