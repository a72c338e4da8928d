//! Entries of the message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way a logged message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sent => f.write_str("sent"),
            Direction::Received => f.write_str("received"),
        }
    }
}

/// One message as shown in the panel.
///
/// `kind` is the wire `type` for protocol traffic, or a local label such as
/// `local_execute` or `apply_tool_error` for relay-side outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: EntryId,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl LogEntry {
    pub fn new(direction: Direction, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: EntryId::new(),
            timestamp: Utc::now(),
            direction,
            kind: kind.into(),
            data,
        }
    }

    pub fn sent(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(Direction::Sent, kind, data)
    }

    pub fn received(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(Direction::Received, kind, data)
    }
}
