//! `scribecast` Relay Library
//!
//! Runs a transcription job end to end:
//! - Worker supervision for the whisper.cpp process
//! - Outbound WebSocket connection to the event listener
//! - Relay pipeline turning worker output into progress/result/error events

pub mod connection;
pub mod relay;
pub mod supervisor;

pub use connection::{ConnectionConfig, ConnectionError, EventSink, WsConnection};
pub use relay::{EventRelay, RelayError, RelayReport, RelayState, run_job, transcribe};
pub use supervisor::{ProcessSupervisor, SupervisorError, WorkerCommand, WorkerProcess, WorkerStatus};
