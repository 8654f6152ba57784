//! `scribecast` Core Library
//!
//! Shared functionality for `scribecast` components:
//! - Job model and local validation
//! - Event envelope and its JSON wire format
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use job::Job;
