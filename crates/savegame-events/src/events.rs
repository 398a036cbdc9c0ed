//! Save and load event payloads.

use serde::Serialize;

use savegame_models::{
    FailureKind, LoadOperation, LoadStrategy, SaveDescriptor, SavePhase, ValidationResult,
};

use crate::bus::EventBus;

/// Progress of a save operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaveEvent {
    Started {
        slot: String,
    },
    Progress {
        slot: String,
        progress: f32,
        phase: SavePhase,
    },
    Completed {
        slot: String,
    },
    Error {
        slot: String,
        message: String,
        kind: FailureKind,
    },
}

impl SaveEvent {
    pub fn slot(&self) -> &str {
        match self {
            SaveEvent::Started { slot }
            | SaveEvent::Progress { slot, .. }
            | SaveEvent::Completed { slot }
            | SaveEvent::Error { slot, .. } => slot,
        }
    }
}

/// Progress of a load operation and slot discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadEvent {
    Started {
        slot: String,
        strategy: LoadStrategy,
    },
    Progress {
        slot: String,
        progress: f32,
        operation: LoadOperation,
    },
    OperationChanged {
        slot: String,
        from: LoadOperation,
        to: LoadOperation,
    },
    Completed {
        slot: String,
    },
    Failed {
        slot: String,
        message: String,
        kind: FailureKind,
    },
    SlotDiscoveryCompleted {
        slots: Vec<SaveDescriptor>,
    },
    FileValidated {
        slot: String,
        result: ValidationResult,
    },
}

impl LoadEvent {
    /// The slot this event concerns, `None` for discovery.
    pub fn slot(&self) -> Option<&str> {
        match self {
            LoadEvent::Started { slot, .. }
            | LoadEvent::Progress { slot, .. }
            | LoadEvent::OperationChanged { slot, .. }
            | LoadEvent::Completed { slot }
            | LoadEvent::Failed { slot, .. }
            | LoadEvent::FileValidated { slot, .. } => Some(slot),
            LoadEvent::SlotDiscoveryCompleted { .. } => None,
        }
    }
}

/// The two buses shared by the save engine and the load orchestrator.
#[derive(Default)]
pub struct SaveEvents {
    pub save: EventBus<SaveEvent>,
    pub load: EventBus<LoadEvent>,
}

impl SaveEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_event_slot_accessors() {
        let save = SaveEvent::Error {
            slot: "career".into(),
            message: "disk full".into(),
            kind: FailureKind::Io,
        };
        assert_eq!(save.slot(), "career");

        let discovery = LoadEvent::SlotDiscoveryCompleted { slots: Vec::new() };
        assert_eq!(discovery.slot(), None);
        let completed = LoadEvent::Completed { slot: "career".into() };
        assert_eq!(completed.slot(), Some("career"));
    }

    #[test]
    fn test_events_serialize_tagged() {
        let event = LoadEvent::OperationChanged {
            slot: "quicksave".into(),
            from: LoadOperation::Initializing,
            to: LoadOperation::Validating,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "operation_changed");
        assert_eq!(json["slot"], "quicksave");
    }

    #[test]
    fn test_hub_buses_are_independent() {
        let hub = SaveEvents::new();
        let save_rx = hub.save.subscribe_channel();
        let load_rx = hub.load.subscribe_channel();

        hub.save.publish(&SaveEvent::Completed { slot: "a".into() });

        assert!(save_rx.recv_timeout(Duration::from_secs(1)).is_ok());
        assert!(load_rx.try_recv().is_err());
    }
}
