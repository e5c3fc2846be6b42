//! Change notifications published by the registry

use super::specialist::SpecialistStatus;
use serde::Serialize;

/// Capacity of the registry event channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something observable happened to the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Registered {
        id: String,
        port: u16,
    },
    StatusChanged {
        id: String,
        from: SpecialistStatus,
        to: SpecialistStatus,
    },
    OutcomeRecorded {
        id: String,
        success: bool,
        elapsed_ms: u64,
        success_rate: f64,
    },
    ProbeRoundCompleted {
        probed: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

impl RegistryEvent {
    /// Specialist the event concerns, if any
    pub fn specialist_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::Registered { id, .. }
            | RegistryEvent::StatusChanged { id, .. }
            | RegistryEvent::OutcomeRecorded { id, .. } => Some(id),
            RegistryEvent::ProbeRoundCompleted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_changed_serialization() {
        let event = RegistryEvent::StatusChanged {
            id: "hermes-ai".to_string(),
            from: SpecialistStatus::Healthy,
            to: SpecialistStatus::Unresponsive,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "status_changed", "id": "hermes-ai", "from": "healthy", "to": "unresponsive"})
        );
        assert_eq!(event.specialist_id(), Some("hermes-ai"));
    }

    #[test]
    fn test_round_event_has_no_specialist() {
        let event = RegistryEvent::ProbeRoundCompleted {
            probed: 3,
            succeeded: 2,
            failed: 1,
            skipped: 0,
        };
        assert_eq!(event.specialist_id(), None);
    }
}
