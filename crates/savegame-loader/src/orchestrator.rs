//! Retrying, self-healing load pipeline over the save engine.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use savegame_engine::{LoadGuard, Result, SaveError, SaveManager};
use savegame_events::{LoadEvent, SaveEvents};
use savegame_models::{
    compatibility, sort_by_last_modified, Compatibility, LoadOperation, LoadStrategy,
    SaveDescriptor, SaveRecord, Severity, ValidationResult,
};
use savegame_persistence::{StorageNotice, StorageService};
use savegame_validation::ValidatorService;

use crate::cache::SlotCache;

/// Loads slots with retries, backup recovery and selectable strategies,
/// and keeps a TTL-cached index of the slots on disk.
///
/// The pipeline for one attempt:
///
/// ```text
/// Initializing -> Validating -> CheckingCompatibility -> [MigratingVersion]
///   -> LoadingData -> [LoadingCoreData] -> ValidatingData -> [SanitizingData]
///   -> FinalValidation -> ApplyingData -> Completed
/// ```
///
/// Writes (migration, recovery) are delegated to the [`SaveManager`].
pub struct LoadManager {
    engine: Arc<SaveManager>,
    storage: Arc<dyn StorageService>,
    validator: Arc<dyn ValidatorService>,
    events: Arc<SaveEvents>,
    cache: Mutex<SlotCache>,
    notices: Mutex<broadcast::Receiver<StorageNotice>>,
}

impl LoadManager {
    pub fn new(engine: Arc<SaveManager>) -> Self {
        let storage = engine.storage();
        let notices = storage.subscribe();
        Self {
            validator: engine.validator(),
            events: engine.events(),
            cache: Mutex::new(SlotCache::new(engine.config().discovery_cache_ttl)),
            notices: Mutex::new(notices),
            storage,
            engine,
        }
    }

    pub fn engine(&self) -> Arc<SaveManager> {
        Arc::clone(&self.engine)
    }

    pub fn events(&self) -> Arc<SaveEvents> {
        Arc::clone(&self.events)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads `slot` with `strategy` and makes it the record in play.
    ///
    /// Returns `None` when another load is running or every attempt failed.
    /// A failed load leaves the record already in play untouched.
    pub async fn load_game(&self, slot: &str, strategy: LoadStrategy) -> Option<SaveRecord> {
        let Some(guard) = self.engine.sessions().try_begin_load(slot, strategy) else {
            warn!(slot = %slot, "load rejected, another load is in progress");
            return None;
        };

        info!(slot = %slot, strategy = %strategy, "loading game");
        self.events.load.publish(&LoadEvent::Started {
            slot: slot.to_string(),
            strategy,
        });

        match self.load_with_retries(&guard, slot, strategy).await {
            Ok(record) => {
                info!(slot = %slot, "game loaded");
                self.events.load.publish(&LoadEvent::Completed {
                    slot: slot.to_string(),
                });
                Some(record)
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "load failed");
                self.events.load.publish(&LoadEvent::Failed {
                    slot: slot.to_string(),
                    message: e.to_string(),
                    kind: e.kind(),
                });
                None
            }
        }
    }

    async fn load_with_retries(
        &self,
        guard: &LoadGuard<'_>,
        slot: &str,
        strategy: LoadStrategy,
    ) -> Result<SaveRecord> {
        let config = self.engine.config();
        let attempts = config.max_load_retries.max(1);
        let mut recovered = false;
        let mut attempt = 1;

        loop {
            let error = match self.run_pipeline(guard, slot, strategy).await {
                Ok(record) => return Ok(record),
                Err(e) => e,
            };

            warn!(slot = %slot, attempt, error = %error, "load attempt failed");
            if !error.is_retryable() || attempt >= attempts {
                return Err(error);
            }
            guard.reset();

            if config.error_recovery_enabled && !recovered {
                recovered = true;
                match self.engine.restore_latest_backup(slot).await {
                    Some(backup) => info!(slot = %slot, backup = %backup.id, "retrying from backup"),
                    None => debug!(slot = %slot, "no backup to recover from"),
                }
            }

            let backoff = config.retry_backoff * attempt;
            debug!(slot = %slot, attempt, backoff_ms = backoff.as_millis() as u64, "backing off");
            tokio::time::sleep(backoff).await;

            if guard.is_cancelled() {
                return Err(SaveError::Cancelled);
            }
            guard.record_retry();
            attempt += 1;
        }
    }

    async fn run_pipeline(
        &self,
        guard: &LoadGuard<'_>,
        slot: &str,
        strategy: LoadStrategy,
    ) -> Result<SaveRecord> {
        let config = self.engine.config();

        self.advance(guard, slot, LoadOperation::Initializing, 0.05)?;
        if !self.storage.slot_exists(slot) {
            return Err(SaveError::NotFound(slot.to_string()));
        }

        if config.auto_validate_before_load {
            self.advance(guard, slot, LoadOperation::Validating, 0.1)?;
            let result = self.validate_file(slot).await?;
            self.events.load.publish(&LoadEvent::FileValidated {
                slot: slot.to_string(),
                result: result.clone(),
            });
            if !result.is_valid {
                return Err(SaveError::Integrity {
                    slot: slot.to_string(),
                    reason: result.summary(),
                });
            }
        }

        self.advance(guard, slot, LoadOperation::CheckingCompatibility, 0.2)?;
        let bytes = self.load_bytes(slot).await?;
        let found = SaveRecord::peek_version(&bytes).ok_or_else(|| SaveError::Integrity {
            slot: slot.to_string(),
            reason: "payload carries no save version".into(),
        })?;
        match compatibility(&found, &config.running_version) {
            Compatibility::Current => {}
            Compatibility::NeedsMigration => {
                self.advance(guard, slot, LoadOperation::MigratingVersion, 0.3)?;
                self.engine.migrate_slot(slot).await?;
            }
            Compatibility::Newer | Compatibility::Unknown => {
                return Err(SaveError::VersionMismatch {
                    slot: slot.to_string(),
                    found,
                    expected: config.running_version.clone(),
                });
            }
        }

        self.advance(guard, slot, LoadOperation::LoadingData, 0.4)?;
        let mut record = self.load_with_strategy(guard, slot, strategy).await?;

        self.advance(guard, slot, LoadOperation::ValidatingData, 0.6)?;
        let result = self.validator.validate(&record);
        if result.is_critical() {
            return Err(SaveError::Integrity {
                slot: slot.to_string(),
                reason: result.summary(),
            });
        }
        if result.needs_sanitizing() {
            self.advance(guard, slot, LoadOperation::SanitizingData, 0.7)?;
            debug!(slot = %slot, issues = %result.summary(), "sanitizing record");
            record = self.validator.sanitize(record);
            record.refresh_checksum();

            let remaining = self.validator.validate(&record);
            if remaining.severity > Severity::None {
                warn!(slot = %slot, issues = %remaining.summary(), "issues remain after sanitizing");
            }
        }

        self.advance(guard, slot, LoadOperation::FinalValidation, 0.8)?;
        if !record.verify_checksum() {
            return Err(SaveError::Integrity {
                slot: slot.to_string(),
                reason: "checksum mismatch after load".into(),
            });
        }
        if record.slot_name != slot {
            return Err(SaveError::Integrity {
                slot: slot.to_string(),
                reason: format!("record belongs to slot {}", record.slot_name),
            });
        }

        self.advance(guard, slot, LoadOperation::ApplyingData, 0.9)?;
        let previous = self.engine.replace_current(slot, record.clone());
        tokio::time::sleep(config.settle_delay).await;

        // Cancelled while settling: the previous record stays in play
        if let Err(e) = self.advance(guard, slot, LoadOperation::Completed, 1.0) {
            self.engine.reinstate_current(previous);
            return Err(e);
        }
        Ok(record)
    }

    /// Moves the session along one edge and reports it.
    fn advance(
        &self,
        guard: &LoadGuard<'_>,
        slot: &str,
        to: LoadOperation,
        progress: f32,
    ) -> Result<()> {
        let from = guard.transition(to)?;
        guard.set_progress(progress);

        self.events.load.publish(&LoadEvent::OperationChanged {
            slot: slot.to_string(),
            from,
            to,
        });
        self.events.load.publish(&LoadEvent::Progress {
            slot: slot.to_string(),
            progress,
            operation: to,
        });
        Ok(())
    }

    async fn validate_file(&self, slot: &str) -> Result<ValidationResult> {
        if !self.storage.validate_file_integrity(slot) {
            return Ok(ValidationResult::critical("payload", "file failed integrity check"));
        }
        let bytes = self.load_bytes(slot).await?;
        Ok(self.validator.validate_structure(&bytes))
    }

    async fn load_bytes(&self, slot: &str) -> Result<Vec<u8>> {
        match self.storage.load_file(slot).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_not_found() => Err(SaveError::NotFound(slot.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_with_strategy(
        &self,
        guard: &LoadGuard<'_>,
        slot: &str,
        strategy: LoadStrategy,
    ) -> Result<SaveRecord> {
        match strategy {
            LoadStrategy::Full => self.engine.read_record(slot).await,
            LoadStrategy::Lazy => {
                let mut record = self.engine.read_record(slot).await?;
                let deferred = record.game_state.instance_count();
                record.game_state.clear_instances();
                record.refresh_checksum();
                debug!(slot = %slot, deferred, "instance collections deferred");
                Ok(record)
            }
            LoadStrategy::Streaming => {
                self.advance(guard, slot, LoadOperation::LoadingCoreData, 0.5)?;
                match self.storage.load_metadata(slot).await {
                    Ok(Some(core)) => {
                        debug!(slot = %slot, version = %core.save_version, "core data loaded")
                    }
                    Ok(None) => debug!(slot = %slot, "no sidecar for core data"),
                    Err(e) => warn!(slot = %slot, error = %e, "core data unreadable"),
                }
                tokio::time::sleep(self.engine.config().streaming_delay).await;
                if guard.is_cancelled() {
                    return Err(SaveError::Cancelled);
                }
                self.engine.read_record(slot).await
            }
        }
    }

    /// Fills collections deferred by a lazy load from disk.
    ///
    /// Returns false if the slot could not be read; the record is then left
    /// as it was.
    pub async fn hydrate_deferred(&self, record: &mut SaveRecord) -> bool {
        if !record.has_deferred_data() {
            return true;
        }

        let slot = record.slot_name.clone();
        match self.engine.read_record(&slot).await {
            Ok(full) => {
                record.game_state.restore_instances(full.game_state);
                record.refresh_checksum();
                if self.engine.current_slot().as_deref() == Some(slot.as_str()) {
                    self.engine.apply_loaded(&slot, record.clone());
                }
                debug!(slot = %slot, instances = record.game_state.instance_count(), "record hydrated");
                true
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "failed to hydrate deferred data");
                false
            }
        }
    }

    /// Soft-cancels the in-flight load.
    ///
    /// The running pipeline stops at its next phase boundary and reports
    /// `Failed` with kind `Cancelled`. A storage call already under way is
    /// not interrupted.
    pub fn cancel_load(&self) -> bool {
        let Some(session) = self.engine.sessions().cancel_load() else {
            return false;
        };

        info!(slot = %session.slot_name, operation = ?session.operation, "load cancelled");
        self.events.load.publish(&LoadEvent::OperationChanged {
            slot: session.slot_name,
            from: session.operation,
            to: LoadOperation::Cancelled,
        });
        true
    }

    pub fn is_loading(&self) -> bool {
        self.engine.sessions().is_loading()
    }

    /// Phase of the in-flight load, `None` when idle.
    pub fn current_operation(&self) -> LoadOperation {
        self.engine
            .sessions()
            .load_session()
            .map(|s| s.operation)
            .unwrap_or_default()
    }

    pub fn load_progress(&self) -> f32 {
        self.engine
            .sessions()
            .load_session()
            .map(|s| s.progress)
            .unwrap_or(0.0)
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Descriptors of every slot on disk, newest first.
    ///
    /// Served from the cache while it is fresh unless `force` is set.
    /// Slots without a readable sidecar get a minimal descriptor.
    pub async fn discover_save_files(&self, force: bool) -> Vec<SaveDescriptor> {
        self.drain_notices();
        let pending = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if !force && cache.is_fresh(Instant::now()) {
                Some(cache.take_pending())
            } else {
                None
            }
        };
        if let Some(pending) = pending {
            return self.refresh_pending(pending).await;
        }

        let slots = match self.storage.available_save_slots() {
            Ok(slots) => slots,
            Err(e) => {
                warn!(error = %e, "failed to enumerate slots");
                Vec::new()
            }
        };

        let mut descriptors = Vec::with_capacity(slots.len());
        for slot in slots {
            descriptors.push(self.describe(&slot).await);
        }
        sort_by_last_modified(&mut descriptors);

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace_all(descriptors.clone(), Instant::now());

        info!(slots = descriptors.len(), "slot discovery completed");
        self.events.load.publish(&LoadEvent::SlotDiscoveryCompleted {
            slots: descriptors.clone(),
        });
        descriptors
    }

    /// Re-reads invalidated slots into a fresh cache and serves it.
    async fn refresh_pending(&self, pending: Vec<String>) -> Vec<SaveDescriptor> {
        let mut refreshed = Vec::new();
        for slot in pending {
            if self.storage.slot_exists(&slot) {
                refreshed.push(self.describe(&slot).await);
            }
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        for descriptor in refreshed {
            cache.insert(descriptor);
        }
        debug!(slots = cache.len(), "slot discovery served from cache");
        cache.descriptors()
    }

    async fn describe(&self, slot: &str) -> SaveDescriptor {
        match self.storage.load_metadata(slot).await {
            Ok(Some(descriptor)) => return descriptor,
            Ok(None) => debug!(slot = %slot, "no sidecar, using minimal descriptor"),
            Err(e) => warn!(slot = %slot, error = %e, "unreadable sidecar, using minimal descriptor"),
        }

        match self.storage.save_file_info(slot) {
            Ok(file) => SaveDescriptor::minimal(slot, file.created_at, file.last_write_at),
            Err(_) => {
                let now = Utc::now();
                SaveDescriptor::minimal(slot, now, now)
            }
        }
    }

    /// Applies pending storage notices to the cache.
    fn drain_notices(&self) {
        let mut notices = self.notices.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match notices.try_recv() {
                Ok(notice) => {
                    debug!(slot = %notice.slot(), "storage notice invalidates slot");
                    cache.invalidate(notice.slot());
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "storage notices lagged, clearing cache");
                    cache.clear();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub fn invalidate_slot(&self, slot: &str) {
        self.drain_notices();
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate(slot);
    }

    pub fn clear_cache(&self) {
        self.drain_notices();
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    use async_trait::async_trait;
    use savegame_engine::SaveConfig;
    use savegame_models::{BackupEntry, FailureKind, RecordBuilder, SaveFileInfo};
    use savegame_persistence::{FileStorage, StorageError, PAYLOAD_FILE};
    use savegame_validation::StandardValidator;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    /// FileStorage that counts enumerations and can fail payload reads.
    struct CountingStorage {
        inner: FileStorage,
        enumerations: AtomicUsize,
        failing_reads: AtomicUsize,
    }

    impl CountingStorage {
        fn new(inner: FileStorage) -> Self {
            Self {
                inner,
                enumerations: AtomicUsize::new(0),
                failing_reads: AtomicUsize::new(0),
            }
        }

        fn fail_next_reads(&self, n: usize) {
            self.failing_reads.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StorageService for CountingStorage {
        async fn load_file(&self, slot: &str) -> savegame_persistence::Result<Vec<u8>> {
            let pending = self.failing_reads.load(Ordering::SeqCst);
            if pending > 0 {
                self.failing_reads.store(pending - 1, Ordering::SeqCst);
                return Err(StorageError::Task("injected read failure".into()));
            }
            self.inner.load_file(slot).await
        }
        async fn save_file_atomic(&self, slot: &str, bytes: &[u8]) -> savegame_persistence::Result<()> {
            self.inner.save_file_atomic(slot, bytes).await
        }
        async fn load_metadata(&self, slot: &str) -> savegame_persistence::Result<Option<SaveDescriptor>> {
            self.inner.load_metadata(slot).await
        }
        async fn save_metadata(
            &self,
            slot: &str,
            descriptor: &SaveDescriptor,
        ) -> savegame_persistence::Result<()> {
            self.inner.save_metadata(slot, descriptor).await
        }
        async fn ensure_slot(&self, slot: &str) -> savegame_persistence::Result<()> {
            self.inner.ensure_slot(slot).await
        }
        fn slot_exists(&self, slot: &str) -> bool {
            self.inner.slot_exists(slot)
        }
        fn validate_file_integrity(&self, slot: &str) -> bool {
            self.inner.validate_file_integrity(slot)
        }
        fn available_save_slots(&self) -> savegame_persistence::Result<Vec<String>> {
            self.enumerations.fetch_add(1, Ordering::SeqCst);
            self.inner.available_save_slots()
        }
        fn available_backups(&self, slot: &str) -> savegame_persistence::Result<Vec<BackupEntry>> {
            self.inner.available_backups(slot)
        }
        async fn create_backup(&self, slot: &str) -> savegame_persistence::Result<Option<BackupEntry>> {
            self.inner.create_backup(slot).await
        }
        async fn delete_backup(&self, slot: &str, id: &str) -> savegame_persistence::Result<()> {
            self.inner.delete_backup(slot, id).await
        }
        async fn restore_from_backup(&self, slot: &str, id: &str) -> savegame_persistence::Result<bool> {
            self.inner.restore_from_backup(slot, id).await
        }
        fn save_file_info(&self, slot: &str) -> savegame_persistence::Result<SaveFileInfo> {
            self.inner.save_file_info(slot)
        }
        async fn delete_slot(&self, slot: &str) -> savegame_persistence::Result<bool> {
            self.inner.delete_slot(slot).await
        }
        fn subscribe(&self) -> broadcast::Receiver<StorageNotice> {
            self.inner.subscribe()
        }
    }

    /// Standard rules, optionally forced critical, counting sanitize calls.
    #[derive(Default)]
    struct SpyValidator {
        inner: StandardValidator,
        force_critical: bool,
        sanitized: AtomicUsize,
    }

    impl ValidatorService for SpyValidator {
        fn validate_structure(&self, bytes: &[u8]) -> ValidationResult {
            self.inner.validate_structure(bytes)
        }
        fn validate(&self, record: &SaveRecord) -> ValidationResult {
            if self.force_critical {
                return ValidationResult::critical("game_state", "unrecoverable");
            }
            self.inner.validate(record)
        }
        fn sanitize(&self, record: SaveRecord) -> SaveRecord {
            self.sanitized.fetch_add(1, Ordering::SeqCst);
            self.inner.sanitize(record)
        }
        fn migrate(&self, record: SaveRecord, target_version: &str) -> Option<SaveRecord> {
            self.inner.migrate(record, target_version)
        }
    }

    struct Fixture {
        dir: TempDir,
        storage: Arc<CountingStorage>,
        validator: Arc<SpyValidator>,
        loader: Arc<LoadManager>,
    }

    impl Fixture {
        fn engine(&self) -> Arc<SaveManager> {
            self.loader.engine()
        }

        fn payload_path(&self, slot: &str) -> PathBuf {
            self.dir.path().join(slot).join(PAYLOAD_FILE)
        }
    }

    fn fast_config() -> SaveConfig {
        SaveConfig::default()
            .with_retries(3, Duration::from_millis(5))
            .with_delays(Duration::ZERO, Duration::ZERO)
    }

    fn fixture_with(config: SaveConfig, validator: SpyValidator) -> Fixture {
        let dir = tempdir().unwrap();
        let storage = Arc::new(CountingStorage::new(FileStorage::new(dir.path())));
        let validator = Arc::new(validator);
        let engine = Arc::new(SaveManager::new(config, storage.clone(), validator.clone()));
        Fixture {
            dir,
            storage,
            validator,
            loader: Arc::new(LoadManager::new(engine)),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(fast_config(), SpyValidator::default())
    }

    fn sample(slot: &str) -> SaveRecord {
        RecordBuilder::new(slot)
            .credits(5000)
            .play_time(2.5)
            .vehicle(json!({"id": "truck-1"}))
            .vehicle(json!({"id": "truck-2"}))
            .contract(json!({"id": "c-1"}))
            .city(json!({"id": "springfield"}))
            .build()
    }

    fn operations(events: &[LoadEvent]) -> Vec<LoadOperation> {
        events
            .iter()
            .filter_map(|e| match e {
                LoadEvent::OperationChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    fn failure_kind(events: &[LoadEvent]) -> Option<FailureKind> {
        events.iter().find_map(|e| match e {
            LoadEvent::Failed { kind, .. } => Some(*kind),
            _ => None,
        })
    }

    fn drain(rx: &Receiver<LoadEvent>) -> Vec<LoadEvent> {
        rx.try_iter().collect()
    }

    #[tokio::test]
    async fn test_full_load_walks_pipeline() {
        let f = fixture();
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let rx = f.loader.events().load.subscribe_channel();

        let record = f.loader.load_game("career", LoadStrategy::Full).await.unwrap();

        assert_eq!(record.current_credits, 5000);
        assert_eq!(record.game_state.instance_count(), 4);
        assert_eq!(f.engine().current_slot().as_deref(), Some("career"));
        assert!(!f.loader.is_loading());

        let events = drain(&rx);
        assert_eq!(
            operations(&events),
            vec![
                LoadOperation::Initializing,
                LoadOperation::Validating,
                LoadOperation::CheckingCompatibility,
                LoadOperation::LoadingData,
                LoadOperation::ValidatingData,
                LoadOperation::FinalValidation,
                LoadOperation::ApplyingData,
                LoadOperation::Completed,
            ]
        );
        assert!(events.iter().any(|e| matches!(e, LoadEvent::FileValidated { .. })));
        assert!(matches!(events.last(), Some(LoadEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_lazy_load_defers_instances_until_hydrated() {
        let f = fixture();
        assert!(f.engine().save_game("career", Some(sample("career"))).await);

        let mut record = f.loader.load_game("career", LoadStrategy::Lazy).await.unwrap();
        assert!(record.has_deferred_data());
        assert_eq!(record.game_state.instance_count(), 0);
        assert!(record.verify_checksum());

        // Deferred records cannot be written back
        assert!(!f.engine().quick_save("manual").await);

        assert!(f.loader.hydrate_deferred(&mut record).await);
        assert!(!record.has_deferred_data());
        assert_eq!(record.game_state.instance_count(), 4);
        assert!(record.verify_checksum());
        assert!(f.engine().quick_save("manual").await);
    }

    #[tokio::test]
    async fn test_streaming_load_passes_core_data_stage() {
        let f = fixture();
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let rx = f.loader.events().load.subscribe_channel();

        let record = f.loader.load_game("career", LoadStrategy::Streaming).await.unwrap();

        assert_eq!(record.game_state.instance_count(), 4);
        let ops = operations(&drain(&rx));
        let core = ops.iter().position(|o| *o == LoadOperation::LoadingCoreData).unwrap();
        assert_eq!(ops[core - 1], LoadOperation::LoadingData);
        assert_eq!(ops[core + 1], LoadOperation::ValidatingData);
    }

    #[tokio::test]
    async fn test_missing_slot_is_not_retried() {
        let f = fixture();
        let rx = f.loader.events().load.subscribe_channel();

        assert!(f.loader.load_game("nowhere", LoadStrategy::Full).await.is_none());

        let events = drain(&rx);
        assert_eq!(failure_kind(&events), Some(FailureKind::NotFound));
        let inits = operations(&events)
            .into_iter()
            .filter(|o| *o == LoadOperation::Initializing)
            .count();
        assert_eq!(inits, 1);
    }

    #[tokio::test]
    async fn test_transient_read_failures_are_retried() {
        let f = fixture_with(
            fast_config().with_error_recovery(false),
            SpyValidator::default(),
        );
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        f.storage.fail_next_reads(2);

        let record = f.loader.load_game("career", LoadStrategy::Full).await;

        assert_eq!(record.unwrap().current_credits, 5000);
    }

    #[tokio::test]
    async fn test_retries_exhausted_leaves_state_untouched() {
        let f = fixture_with(
            fast_config().with_error_recovery(false),
            SpyValidator::default(),
        );
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let other = RecordBuilder::new("other").credits(7).build();
        assert!(f.engine().save_game("other", Some(other)).await);
        std::fs::write(f.payload_path("career"), b"{ not json").unwrap();
        let rx = f.loader.events().load.subscribe_channel();

        assert!(f.loader.load_game("career", LoadStrategy::Full).await.is_none());

        let events = drain(&rx);
        assert_eq!(failure_kind(&events), Some(FailureKind::Integrity));
        let attempts = operations(&events)
            .into_iter()
            .filter(|o| *o == LoadOperation::Initializing)
            .count();
        assert_eq!(attempts, 3);
        assert_eq!(f.engine().current_slot().as_deref(), Some("other"));
        assert_eq!(f.engine().current_record().unwrap().current_credits, 7);
    }

    #[tokio::test]
    async fn test_corrupt_slot_recovers_from_latest_backup() {
        let f = fixture();
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let newer = RecordBuilder::new("career").credits(9000).build();
        assert!(f.engine().save_game("career", Some(newer)).await);
        std::fs::write(f.payload_path("career"), b"garbage").unwrap();

        let record = f.loader.load_game("career", LoadStrategy::Full).await.unwrap();

        // The newest backup holds the payload before the last overwrite
        assert_eq!(record.current_credits, 5000);
        assert_eq!(f.engine().current_record().unwrap().current_credits, 5000);
    }

    #[tokio::test]
    async fn test_critical_result_is_never_sanitized() {
        let f = fixture_with(
            fast_config().with_retries(1, Duration::ZERO),
            SpyValidator {
                force_critical: true,
                ..SpyValidator::default()
            },
        );
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let rx = f.loader.events().load.subscribe_channel();

        assert!(f.loader.load_game("career", LoadStrategy::Full).await.is_none());

        assert_eq!(f.validator.sanitized.load(Ordering::SeqCst), 0);
        let events = drain(&rx);
        assert_eq!(failure_kind(&events), Some(FailureKind::Integrity));
        assert!(!operations(&events).contains(&LoadOperation::SanitizingData));
    }

    #[tokio::test]
    async fn test_recoverable_issues_are_sanitized() {
        let f = fixture();
        let record = RecordBuilder::new("career").credits(-50).build();
        assert!(f.engine().save_game("career", Some(record)).await);
        let rx = f.loader.events().load.subscribe_channel();

        let loaded = f.loader.load_game("career", LoadStrategy::Full).await.unwrap();

        assert_eq!(loaded.current_credits, 0);
        assert!(loaded.verify_checksum());
        assert_eq!(f.validator.sanitized.load(Ordering::SeqCst), 1);
        assert!(operations(&drain(&rx)).contains(&LoadOperation::SanitizingData));
    }

    #[tokio::test]
    async fn test_old_version_migrates_during_load() {
        let f = fixture();
        let mut old = RecordBuilder::new("career").version("1.0.0").credits(10).build();
        old.refresh_checksum();
        std::fs::create_dir_all(f.dir.path().join("career")).unwrap();
        std::fs::write(f.payload_path("career"), old.to_bytes().unwrap()).unwrap();
        let rx = f.loader.events().load.subscribe_channel();

        let loaded = f.loader.load_game("career", LoadStrategy::Full).await.unwrap();

        assert_eq!(loaded.save_version, "1.2.0");
        assert!(operations(&drain(&rx)).contains(&LoadOperation::MigratingVersion));
        let on_disk = f.engine().read_record("career").await.unwrap();
        assert_eq!(on_disk.save_version, "1.2.0");
    }

    #[tokio::test]
    async fn test_newer_version_fails_with_mismatch() {
        let f = fixture_with(
            fast_config().with_retries(1, Duration::ZERO),
            SpyValidator::default(),
        );
        let mut future = RecordBuilder::new("career").version("9.0.0").build();
        future.refresh_checksum();
        std::fs::create_dir_all(f.dir.path().join("career")).unwrap();
        std::fs::write(f.payload_path("career"), future.to_bytes().unwrap()).unwrap();
        let rx = f.loader.events().load.subscribe_channel();

        assert!(f.loader.load_game("career", LoadStrategy::Full).await.is_none());
        assert_eq!(failure_kind(&drain(&rx)), Some(FailureKind::VersionMismatch));
    }

    #[tokio::test]
    async fn test_concurrent_load_rejected() {
        let f = fixture();
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let engine = f.engine();
        let _held = engine
            .sessions()
            .try_begin_load("career", LoadStrategy::Full)
            .unwrap();

        assert!(f.loader.load_game("career", LoadStrategy::Full).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_pipeline_at_next_phase() {
        let f = fixture_with(
            fast_config().with_delays(Duration::ZERO, Duration::from_millis(300)),
            SpyValidator::default(),
        );
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let rx = f.loader.events().load.subscribe_channel();

        let loader = Arc::clone(&f.loader);
        let task = tokio::spawn(async move { loader.load_game("career", LoadStrategy::Streaming).await });

        for _ in 0..100 {
            if f.loader.current_operation() == LoadOperation::LoadingCoreData {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(f.loader.cancel_load());
        assert!(!f.loader.is_loading());

        assert!(task.await.unwrap().is_none());
        let events = drain(&rx);
        assert!(events.iter().any(|e| matches!(
            e,
            LoadEvent::Failed { slot, kind: FailureKind::Cancelled, .. } if slot == "career"
        )));
        assert!(operations(&events).contains(&LoadOperation::Cancelled));
        assert!(f.engine().current_slot().is_some());
    }

    #[tokio::test]
    async fn test_cancel_while_applying_keeps_previous_record() {
        let f = fixture_with(
            fast_config().with_delays(Duration::from_millis(400), Duration::ZERO),
            SpyValidator::default(),
        );
        assert!(f.engine().save_game("career", Some(sample("career"))).await);
        let other = RecordBuilder::new("other").credits(7).build();
        assert!(f.engine().save_game("other", Some(other)).await);
        let rx = f.loader.events().load.subscribe_channel();

        let loader = Arc::clone(&f.loader);
        let task = tokio::spawn(async move { loader.load_game("career", LoadStrategy::Full).await });

        for _ in 0..200 {
            if f.loader.current_operation() == LoadOperation::ApplyingData {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.loader.current_operation(), LoadOperation::ApplyingData);
        assert!(f.loader.cancel_load());

        assert!(task.await.unwrap().is_none());
        assert!(drain(&rx).iter().any(|e| matches!(
            e,
            LoadEvent::Failed { kind: FailureKind::Cancelled, .. }
        )));
        assert_eq!(f.engine().current_slot().as_deref(), Some("other"));
        assert_eq!(f.engine().current_record().unwrap().current_credits, 7);
    }

    #[tokio::test]
    async fn test_cancel_when_idle() {
        let f = fixture();
        assert!(!f.loader.cancel_load());
        assert_eq!(f.loader.current_operation(), LoadOperation::None);
        assert_eq!(f.loader.load_progress(), 0.0);
    }

    #[tokio::test]
    async fn test_discovery_is_cached_within_ttl() {
        let f = fixture();
        assert!(f.engine().save_game("a", Some(sample("a"))).await);
        assert!(f.engine().save_game("b", Some(sample("b"))).await);
        let rx = f.loader.events().load.subscribe_channel();

        let first = f.loader.discover_save_files(false).await;
        let second = f.loader.discover_save_files(false).await;

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].slot_name, "b");
        assert_eq!(f.storage.enumerations.load(Ordering::SeqCst), 1);
        let discoveries = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, LoadEvent::SlotDiscoveryCompleted { .. }))
            .count();
        assert_eq!(discoveries, 1);

        f.loader.discover_save_files(true).await;
        assert_eq!(f.storage.enumerations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_storage_notices_refresh_only_their_slot() {
        let f = fixture();
        assert!(f.engine().save_game("a", Some(sample("a"))).await);
        assert_eq!(f.loader.discover_save_files(false).await.len(), 1);

        let b = RecordBuilder::new("b").credits(42).build();
        assert!(f.engine().save_game("b", Some(b)).await);
        let slots = f.loader.discover_save_files(false).await;
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].slot_name, "b");
        assert_eq!(slots[0].current_credits, 42);

        assert!(f.engine().delete_save_slot("a").await);
        let slots = f.loader.discover_save_files(false).await;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].slot_name, "b");

        // Every refresh after the first was per slot
        assert_eq!(f.storage.enumerations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manual_invalidation_and_clear() {
        let f = fixture();
        assert!(f.engine().save_game("a", Some(sample("a"))).await);
        f.loader.discover_save_files(false).await;

        f.loader.invalidate_slot("a");
        assert_eq!(f.loader.discover_save_files(false).await.len(), 1);
        assert_eq!(f.storage.enumerations.load(Ordering::SeqCst), 1);

        f.loader.clear_cache();
        assert_eq!(f.loader.discover_save_files(false).await.len(), 1);
        assert_eq!(f.storage.enumerations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discovery_falls_back_to_minimal_descriptor() {
        let f = fixture();
        let record = sample("bare");
        std::fs::create_dir_all(f.dir.path().join("bare")).unwrap();
        std::fs::write(f.payload_path("bare"), record.to_bytes().unwrap()).unwrap();

        let slots = f.loader.discover_save_files(false).await;

        assert_eq!(slots.len(), 1);
        assert!(slots[0].is_minimal());
        assert_eq!(slots[0].save_version, "Unknown");
    }
}
