//! Event envelope relayed to the remote listener.
//!
//! Every event travels as one JSON text frame:
//! ```json
//! {"type":"progress","client_id":"abc","data":"[00:00.000 --> 00:02.000] hello"}
//! ```

use serde::{Deserialize, Serialize};

/// Kind of a relayed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// One line of worker output, relayed as soon as it was read.
    Progress,
    /// Output drained after the worker exited. Terminal.
    Result,
    /// Failure description. Terminal.
    Error,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed envelope tagged with the job's client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub client_id: String,
    #[serde(rename = "data")]
    pub payload: String,
}

impl Event {
    pub fn progress(client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(EventKind::Progress, client_id, payload)
    }

    pub fn result(client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(EventKind::Result, client_id, payload)
    }

    pub fn error(client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(EventKind::Error, client_id, payload)
    }

    fn new(kind: EventKind, client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind,
            client_id: client_id.into(),
            payload: payload.into(),
        }
    }

    /// Whether this event ends the job's event sequence.
    pub const fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Result | EventKind::Error)
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the wire representation.
    pub fn from_json(s: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
