//! Supervision of the external transcription worker.

pub mod manager;
pub mod process;

pub use manager::{ProcessSupervisor, SupervisorError, WorkerCommand};
pub use process::{WorkerProcess, WorkerStatus};
