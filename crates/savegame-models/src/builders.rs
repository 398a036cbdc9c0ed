//! Builder for assembling save records.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::record::{GameSettings, SaveRecord};

/// Builder for creating [`SaveRecord`] instances with a fluent API.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: SaveRecord,
}

impl RecordBuilder {
    /// Creates a builder for the given slot. The display name defaults to
    /// the slot name.
    pub fn new(slot_name: impl Into<String>) -> Self {
        let slot_name = slot_name.into();
        Self {
            record: SaveRecord::new(slot_name.clone(), slot_name),
        }
    }

    /// Sets the display name.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.record.display_name = name.into();
        self
    }

    pub fn credits(mut self, credits: i64) -> Self {
        self.record.current_credits = credits;
        self
    }

    pub fn play_time(mut self, hours: f64) -> Self {
        self.record.play_time_hours = hours;
        self
    }

    pub fn contracts(mut self, total: u32) -> Self {
        self.record.total_contracts = total;
        self
    }

    /// Overrides the schema version (used to produce legacy fixtures).
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.record.save_version = version.into();
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.created_at = at;
        if self.record.last_modified < at {
            self.record.last_modified = at;
        }
        self
    }

    /// Adds a vehicle instance.
    pub fn vehicle(mut self, vehicle: impl Into<Value>) -> Self {
        self.record.game_state.vehicles.push(vehicle.into());
        self
    }

    /// Adds a contract instance.
    pub fn contract(mut self, contract: impl Into<Value>) -> Self {
        self.record.game_state.contracts.push(contract.into());
        self
    }

    /// Adds a city instance.
    pub fn city(mut self, city: impl Into<Value>) -> Self {
        self.record.game_state.cities.push(city.into());
        self
    }

    /// Adds a free-form world key.
    pub fn world(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record.game_state.extra.insert(key.into(), value.into());
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.record.player_progress.level = level;
        self
    }

    pub fn unlock(mut self, unlock: impl Into<String>) -> Self {
        self.record.player_progress.unlocks.push(unlock.into());
        self
    }

    /// Adds a settings value.
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record.settings.values.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole settings section.
    pub fn settings(mut self, settings: GameSettings) -> Self {
        self.record.settings = settings;
        self
    }

    /// Builds the record with a checksum matching its content.
    pub fn build(mut self) -> SaveRecord {
        self.record.refresh_checksum();
        self.record
    }
}
