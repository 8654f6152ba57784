//! Relay module types.

use crate::connection::ConnectionError;
use crate::supervisor::{SupervisorError, WorkerStatus};

/// Lifecycle of one relay session.
///
/// `Connected -> Streaming -> Finished -> Closed` on success, any phase
/// `-> Failed -> Closed` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Connection open, worker not started yet.
    Connected,
    /// Worker running, output being relayed as progress.
    Streaming,
    /// Result event delivered.
    Finished,
    /// Job aborted.
    Failed,
    /// Connection released. Nothing more is sent.
    Closed,
}

impl RelayState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Streaming => "streaming",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a job that delivered its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub progress_events: usize,
    /// Size of the result payload in bytes.
    pub result_bytes: usize,
    pub worker_status: WorkerStatus,
}

/// Errors from relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] scribecast_core::Error),

    #[error(transparent)]
    Connect(ConnectionError),

    #[error(transparent)]
    Launch(SupervisorError),

    #[error("Worker output error: {0}")]
    Stream(String),

    #[error("Connection lost: {0}")]
    Transmit(String),

    #[error("Transcription cancelled")]
    Cancelled,
}

impl RelayError {
    /// Whether the listener should receive an error event for this failure.
    ///
    /// Validation and connect failures happen before a connection exists,
    /// transmit failures mean it is gone.
    pub const fn is_reportable(&self) -> bool {
        matches!(self, Self::Launch(_) | Self::Stream(_) | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failures_with_a_live_connection_are_reported() {
        assert!(RelayError::Stream("bad utf-8".into()).is_reportable());
        assert!(RelayError::Cancelled.is_reportable());
        assert!(
            RelayError::Launch(SupervisorError::Launch {
                binary: "main".into(),
                reason: "not found".into(),
            })
            .is_reportable()
        );
        assert!(!RelayError::Transmit("reset".into()).is_reportable());
        assert!(!RelayError::Connect(ConnectionError::Closed).is_reportable());
        assert!(
            !RelayError::Validation(scribecast_core::Error::Validation("x".into()))
                .is_reportable()
        );
    }

    #[test]
    fn launch_error_message_names_binary() {
        let err = RelayError::Launch(SupervisorError::Launch {
            binary: "./whisper.cpp/main".into(),
            reason: "No such file or directory".into(),
        });
        assert_eq!(
            err.to_string(),
            "Failed to launch worker ./whisper.cpp/main: No such file or directory"
        );
    }

    #[test]
    fn state_display() {
        assert_eq!(RelayState::Streaming.to_string(), "streaming");
        assert_eq!(RelayState::Closed.to_string(), "closed");
    }
}
