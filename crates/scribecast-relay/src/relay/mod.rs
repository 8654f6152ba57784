//! Relay module: bridges worker output with the outbound event connection.
//!
//! This is the "glue" that connects:
//! - `ProcessSupervisor` (spawn, stdout lines, kill)
//! - `EventSink` (JSON text frames to the listener)
//! - job cancellation via a shared shutdown signal

mod pipeline;
mod runner;
mod types;

pub use pipeline::EventRelay;
pub use runner::{run_job, transcribe};
pub use types::*;
