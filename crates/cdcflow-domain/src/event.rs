use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::enums::EventType;

/// A single change-data-capture record, uniform across MySQL/Postgres/Mongo.
///
/// Invariant: `data` always contains the configured primary-key column —
/// cursors are responsible for this before emitting the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub table: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub progress: Checkpoint,
}

impl Event {
    pub fn new(event_type: EventType, table: impl Into<String>, data: serde_json::Map<String, serde_json::Value>, progress: Checkpoint) -> Self {
        Self { event_type, table: table.into(), data, progress }
    }

    /// The primary-key value for this event under `pk`, if present.
    pub fn pk_value<'a>(&'a self, pk: &str) -> Option<&'a serde_json::Value> {
        self.data.get(pk)
    }
}

/// Emitted once at stream start (and, for file/batched paths, whenever a
/// checkpoint advances without an associated row mutation) to anchor the
/// resume point. Carries no document effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress: Checkpoint,
}

impl ProgressEvent {
    pub fn new(progress: Checkpoint) -> Self {
        Self { progress }
    }
}

/// What a source cursor's `stream()` yields: either a bare progress anchor
/// or a full event. Kept here (rather than only in `cdcflow-core`) because
/// it is part of the uniform event model every source and the engine
/// agree on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceMessage {
    Progress(ProgressEvent),
    Event(Event),
}

impl SourceMessage {
    pub fn progress(&self) -> &Checkpoint {
        match self {
            SourceMessage::Progress(p) => &p.progress,
            SourceMessage::Event(e) => &e.progress,
        }
    }
}
