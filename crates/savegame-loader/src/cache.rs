//! TTL cache over slot descriptors.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use savegame_models::{sort_by_last_modified, SaveDescriptor};

/// Descriptors from the last slot discovery.
///
/// The cache is fresh for `ttl` after a full refresh. Invalidating a slot
/// drops only its entry and queues the slot for a single re-read; the
/// rest stays cached. `clear` forces the next discovery to rescan.
/// Methods take `now` explicitly.
#[derive(Debug)]
pub struct SlotCache {
    ttl: Duration,
    entries: HashMap<String, SaveDescriptor>,
    pending: BTreeSet<String>,
    last_refresh: Option<Instant>,
}

impl SlotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            pending: BTreeSet::new(),
            last_refresh: None,
        }
    }

    /// True when a discovery can be served from the cache.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.last_refresh
            .is_some_and(|at| now.saturating_duration_since(at) < self.ttl)
    }

    /// Cached descriptors, newest first.
    pub fn descriptors(&self) -> Vec<SaveDescriptor> {
        let mut list: Vec<SaveDescriptor> = self.entries.values().cloned().collect();
        sort_by_last_modified(&mut list);
        list
    }

    /// Replaces the whole cache with a fresh discovery.
    pub fn replace_all(&mut self, descriptors: Vec<SaveDescriptor>, now: Instant) {
        self.entries = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.slot_name.clone(), descriptor))
            .collect();
        self.pending.clear();
        self.last_refresh = Some(now);
    }

    /// Caches one re-read descriptor without touching the refresh time.
    pub fn insert(&mut self, descriptor: SaveDescriptor) {
        self.pending.remove(&descriptor.slot_name);
        self.entries.insert(descriptor.slot_name.clone(), descriptor);
    }

    /// Drops one slot's entry and queues it for a re-read.
    pub fn invalidate(&mut self, slot: &str) {
        self.entries.remove(slot);
        self.pending.insert(slot.to_string());
    }

    /// Slots invalidated since they were last cached.
    pub fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
        self.last_refresh = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
