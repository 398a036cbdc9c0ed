//! Forward migration of save records between schema versions.
//!
//! Each step upgrades a record by exactly one schema version. A migration
//! to a target walks the chain of steps from the record's version and
//! fails if the chain has a gap or the record is already newer.
//!
//! Known history:
//!
//! ```text
//! 1.0.0 ──► 1.1.0 ──► 1.2.0
//!   │         │
//!   │         └─ settings schema 1 → 2, world instance lists moved
//!   └─ settings gain a schema version, progress keys renamed
//! ```

use serde_json::Value;
use tracing::{debug, warn};

use savegame_models::{SaveRecord, SaveVersion};

/// One single-version upgrade.
#[derive(Clone)]
pub struct MigrationStep {
    pub from: SaveVersion,
    pub to: SaveVersion,
    apply: fn(&mut SaveRecord),
}

impl MigrationStep {
    pub fn new(from: SaveVersion, to: SaveVersion, apply: fn(&mut SaveRecord)) -> Self {
        Self { from, to, apply }
    }
}

/// Ordered table of migration steps.
#[derive(Clone)]
pub struct Migrator {
    steps: Vec<MigrationStep>,
}

impl Migrator {
    /// An empty migrator, for custom chains.
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// The chain for every schema this build knows about.
    pub fn standard() -> Self {
        Self::empty()
            .with_step(MigrationStep::new(
                SaveVersion::new(1, 0, 0),
                SaveVersion::new(1, 1, 0),
                upgrade_1_0_to_1_1,
            ))
            .with_step(MigrationStep::new(
                SaveVersion::new(1, 1, 0),
                SaveVersion::new(1, 2, 0),
                upgrade_1_1_to_1_2,
            ))
    }

    pub fn with_step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Versions visited going from `from` to `to`, excluding `from`.
    ///
    /// Returns `None` when there is no chain (including backward requests).
    pub fn path(&self, from: SaveVersion, to: SaveVersion) -> Option<Vec<SaveVersion>> {
        if from > to {
            return None;
        }
        let mut path = Vec::new();
        let mut current = from;
        while current < to {
            let step = self.steps.iter().find(|s| s.from == current)?;
            if step.to <= current || step.to > to {
                return None;
            }
            current = step.to;
            path.push(current);
        }
        Some(path)
    }

    /// Upgrades a record to `target`.
    ///
    /// The checksum is left stale; callers restamp the record before
    /// writing it.
    pub fn migrate(&self, mut record: SaveRecord, target: &str) -> Option<SaveRecord> {
        let to = SaveVersion::parse(target)?;
        let from = SaveVersion::parse(&record.save_version)?;

        let Some(path) = self.path(from, to) else {
            warn!(
                slot = %record.slot_name,
                from = %from,
                to = %to,
                "no migration path"
            );
            return None;
        };

        let mut current = from;
        for next in path {
            if let Some(step) = self.steps.iter().find(|s| s.from == current) {
                (step.apply)(&mut record);
                debug!(slot = %record.slot_name, from = %current, to = %next, "migration step applied");
            }
            current = next;
            record.save_version = current.to_string();
        }
        Some(record)
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::standard()
    }
}

fn upgrade_1_0_to_1_1(record: &mut SaveRecord) {
    if record.settings.schema_version == 0 {
        record.settings.schema_version = 1;
    }

    let progress = &mut record.player_progress;
    if let Some(xp) = progress.extra.remove("xp").and_then(|v| v.as_u64()) {
        progress.experience = progress.experience.max(xp);
    }
    if let Some(Value::Array(items)) = progress.extra.remove("unlocked") {
        for item in items {
            if let Value::String(unlock) = item {
                if !progress.unlocks.contains(&unlock) {
                    progress.unlocks.push(unlock);
                }
            }
        }
    }

    if record.display_name.trim().is_empty() {
        record.display_name = record.slot_name.clone();
    }
}

fn upgrade_1_1_to_1_2(record: &mut SaveRecord) {
    let settings = &mut record.settings;
    if settings.schema_version < 2 {
        if let Some(volume) = settings.values.remove("volume") {
            settings
                .values
                .entry("audio.master_volume".to_string())
                .or_insert(volume);
        }
        settings.schema_version = 2;
    }

    let state = &mut record.game_state;
    for (legacy, target) in [
        ("vehicle_list", &mut state.vehicles),
        ("contract_list", &mut state.contracts),
        ("city_list", &mut state.cities),
    ] {
        if let Some(Value::Array(items)) = state.extra.remove(legacy) {
            if target.is_empty() {
                *target = items;
            }
        }
    }
}
