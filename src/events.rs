//! Outbound realtime event port
//!
//! The engine publishes events after successful state transitions and never
//! conditions correctness on delivery. The transport layer (sockets, SSE,
//! whatever) implements [`EventSink`]; the engine stays ignorant of it.

use serde::Serialize;
use tracing::info;

use crate::types::{DebateStatus, PlayerType, Stance, Submitter};

/// Fire-and-forget notifications consumed by the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    DebateStarted {
        debate_id: String,
        first_player: Stance,
        opponent: PlayerType,
    },
    ArgumentAdded {
        debate_id: String,
        round: u32,
        stance: Stance,
        submitted_by: Submitter,
    },
    DebateCompleted {
        debate_id: String,
        status: DebateStatus,
    },
    CleanupSummary {
        abandoned_waiting: usize,
        abandoned_active: usize,
    },
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: DebateEvent);
}

/// Drops every event. Useful in tests and batch tooling.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: DebateEvent) {}
}

/// Logs events as structured JSON lines.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: DebateEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(event = %json, "debate event"),
            Err(e) => info!(error = %e, "unserializable debate event"),
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Records published events for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<DebateEvent>>,
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: DebateEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DebateEvent::ArgumentAdded {
            debate_id: "d1".to_string(),
            round: 3,
            stance: Stance::Against,
            submitted_by: Submitter::Ai,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"argument_added\""));
        assert!(json.contains("\"stance\":\"against\""));
        assert!(json.contains("\"submitted_by\":\"ai\""));
    }
}
