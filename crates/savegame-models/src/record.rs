//! The full save snapshot and its nested payload sections.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::version::CURRENT_SAVE_VERSION;

/// Schema version of [`GameSettings`] written by this build.
pub const SETTINGS_SCHEMA_VERSION: u32 = 2;

/// World state: the large instance collections plus anything else the game
/// stores at the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Owned vehicle instances.
    #[serde(default)]
    pub vehicles: Vec<Value>,

    /// Active and historical contract instances.
    #[serde(default)]
    pub contracts: Vec<Value>,

    /// City instances.
    #[serde(default)]
    pub cities: Vec<Value>,

    /// Remaining world keys the core never inspects.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,

    /// Set when the instance collections were cleared by a lazy load and
    /// still need to be hydrated before this state may be saved again.
    #[serde(skip)]
    pub deferred: bool,
}

impl GameState {
    /// Total number of vehicle, contract and city instances.
    pub fn instance_count(&self) -> usize {
        self.vehicles.len() + self.contracts.len() + self.cities.len()
    }

    /// Drops the instance collections and marks them deferred.
    pub fn clear_instances(&mut self) {
        self.vehicles.clear();
        self.contracts.clear();
        self.cities.clear();
        self.deferred = true;
    }

    /// Takes the instance collections from a fully loaded state.
    pub fn restore_instances(&mut self, full: GameState) {
        self.vehicles = full.vehicles;
        self.contracts = full.contracts;
        self.cities = full.cities;
        self.deferred = false;
    }
}

/// Player progression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProgress {
    #[serde(default)]
    pub level: u32,

    #[serde(default)]
    pub experience: u64,

    #[serde(default)]
    pub unlocks: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Explicitly versioned settings section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            values: BTreeMap::new(),
        }
    }
}

/// A complete snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub slot_name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub play_time_hours: f64,
    pub current_credits: i64,
    pub total_contracts: u32,
    pub save_version: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub game_state: GameState,
    #[serde(default)]
    pub player_progress: PlayerProgress,
    #[serde(default)]
    pub settings: GameSettings,
}

/// The fields the checksum covers. Timestamps and the checksum itself are
/// left out so an unchanged resave hashes identically.
#[derive(Serialize)]
struct ChecksumView<'a> {
    slot_name: &'a str,
    display_name: &'a str,
    play_time_hours: f64,
    current_credits: i64,
    total_contracts: u32,
    save_version: &'a str,
    game_state: &'a GameState,
    player_progress: &'a PlayerProgress,
    settings: &'a GameSettings,
}

/// Just enough of a payload to read its version without a full decode.
#[derive(Deserialize)]
struct VersionProbe {
    save_version: String,
}

impl SaveRecord {
    /// Creates an empty record at the current schema version.
    pub fn new(slot_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            slot_name: slot_name.into(),
            display_name: display_name.into(),
            created_at: now,
            last_modified: now,
            play_time_hours: 0.0,
            current_credits: 0,
            total_contracts: 0,
            save_version: CURRENT_SAVE_VERSION.to_string(),
            checksum: String::new(),
            game_state: GameState::default(),
            player_progress: PlayerProgress::default(),
            settings: GameSettings::default(),
        }
    }

    /// SHA-256 (hex) over the checksummed view of this record.
    pub fn compute_checksum(&self) -> String {
        let view = ChecksumView {
            slot_name: &self.slot_name,
            display_name: &self.display_name,
            play_time_hours: self.play_time_hours,
            current_credits: self.current_credits,
            total_contracts: self.total_contracts,
            save_version: &self.save_version,
            game_state: &self.game_state,
            player_progress: &self.player_progress,
            settings: &self.settings,
        };
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Recomputes and stores the checksum.
    pub fn refresh_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// True when the stored checksum matches the content.
    pub fn verify_checksum(&self) -> bool {
        !self.checksum.is_empty() && self.checksum == self.compute_checksum()
    }

    /// Prepares the record for writing to `slot`.
    pub fn stamp(&mut self, slot: &str, version: &str, now: DateTime<Utc>) {
        self.slot_name = slot.to_string();
        self.save_version = version.to_string();
        self.last_modified = now;
        if self.created_at > now {
            self.created_at = now;
        }
        self.refresh_checksum();
    }

    /// Encodes the record as the on-disk payload.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Decodes an on-disk payload.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Reads the schema version from a payload without decoding the rest.
    pub fn peek_version(bytes: &[u8]) -> Option<String> {
        serde_json::from_slice::<VersionProbe>(bytes)
            .ok()
            .map(|p| p.save_version)
    }

    /// True when a lazy load left collections that must be hydrated first.
    pub fn has_deferred_data(&self) -> bool {
        self.game_state.deferred
    }
}
