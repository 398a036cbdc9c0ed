//! Sidecar metadata and file-level info about slots.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::SaveRecord;
use crate::version::UNKNOWN_VERSION;

/// Lightweight mirror of a record's scalar fields, stored next to the
/// payload so listings never decode full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveDescriptor {
    pub slot_name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub play_time_hours: f64,
    #[serde(default)]
    pub current_credits: i64,
    #[serde(default)]
    pub total_contracts: u32,
    pub save_version: String,
    #[serde(default)]
    pub checksum: String,
}

impl SaveDescriptor {
    /// Builds the sidecar for a stamped record.
    pub fn from_record(record: &SaveRecord) -> Self {
        Self {
            slot_name: record.slot_name.clone(),
            display_name: record.display_name.clone(),
            created_at: record.created_at,
            last_modified: record.last_modified,
            play_time_hours: record.play_time_hours,
            current_credits: record.current_credits,
            total_contracts: record.total_contracts,
            save_version: record.save_version.clone(),
            checksum: record.checksum.clone(),
        }
    }

    /// Fallback used when a slot's sidecar cannot be read.
    pub fn minimal(
        slot_name: impl Into<String>,
        created_at: DateTime<Utc>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let slot_name = slot_name.into();
        Self {
            display_name: slot_name.clone(),
            slot_name,
            created_at,
            last_modified,
            play_time_hours: 0.0,
            current_credits: 0,
            total_contracts: 0,
            save_version: UNKNOWN_VERSION.to_string(),
            checksum: String::new(),
        }
    }

    /// True for descriptors produced by [`SaveDescriptor::minimal`].
    pub fn is_minimal(&self) -> bool {
        self.save_version == UNKNOWN_VERSION
    }
}

/// Sorts descriptors newest first.
pub fn sort_by_last_modified(descriptors: &mut [SaveDescriptor]) {
    descriptors.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.slot_name.cmp(&b.slot_name))
    });
}

/// File-system facts about a slot's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFileInfo {
    pub created_at: DateTime<Utc>,
    pub last_write_at: DateTime<Utc>,
    pub is_valid: bool,
    pub size_bytes: u64,
}

/// Descriptor plus file state, as shown to a player picking a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub descriptor: SaveDescriptor,
    pub is_valid: bool,
    pub size_bytes: u64,
}

/// A timestamped copy of a slot's previous payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Directory name, `{slot}_backup_{timestamp}`.
    pub id: String,
    pub slot_name: String,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
}
