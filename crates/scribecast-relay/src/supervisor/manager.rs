//! Transcription worker launcher.
//!
//! Builds the fixed whisper.cpp argument vector and spawns exactly one worker
//! per job. The worker is an opaque executable; only its stdout is relayed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::info;

use scribecast_core::Job;
use scribecast_core::config::WorkerConfig;

use super::process::WorkerProcess;

/// Fixed worker invocation: `<binary> -m <model_path> -f <audio_path> -otxt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub binary: PathBuf,
    pub model_path: PathBuf,
}

impl WorkerCommand {
    pub fn new(binary: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            model_path: model_path.into(),
        }
    }

    /// Argument vector for one audio file (binary excluded).
    pub fn args(&self, audio_path: &Path) -> Vec<OsString> {
        vec![
            "-m".into(),
            self.model_path.clone().into_os_string(),
            "-f".into(),
            audio_path.as_os_str().to_owned(),
            "-otxt".into(),
        ]
    }
}

/// Launches transcription workers.
///
/// Holds no per-job state; every [`WorkerProcess`] it returns is owned by
/// the caller, so concurrent jobs share nothing.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    command: WorkerCommand,
    drain_timeout: Duration,
}

impl ProcessSupervisor {
    pub const fn new(command: WorkerCommand, drain_timeout: Duration) -> Self {
        Self {
            command,
            drain_timeout,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            WorkerCommand::new(&config.binary, &config.model_path),
            config.drain_timeout(),
        )
    }

    pub const fn command(&self) -> &WorkerCommand {
        &self.command
    }

    /// Spawn the worker for `job`.
    ///
    /// stdout is captured as the relayed line stream, stderr separately for
    /// diagnostics. On unix the worker leads its own process group so that
    /// killing it also takes down anything it forked.
    pub fn start(&self, job: &Job) -> Result<WorkerProcess, SupervisorError> {
        let binary = self.command.binary.display().to_string();
        let mut cmd = Command::new(&self.command.binary);
        cmd.args(self.command.args(job.audio_path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        info!(
            binary = %binary,
            model = %self.command.model_path.display(),
            audio = %job.audio_path().display(),
            client_id = job.client_id(),
            "Spawning transcription worker"
        );
        let child = cmd.spawn().map_err(|e| SupervisorError::Launch {
            binary: binary.clone(),
            reason: e.to_string(),
        })?;

        WorkerProcess::new(child, &binary, self.drain_timeout)
    }
}

/// Errors from worker supervision.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to launch worker {binary}: {reason}")]
    Launch { binary: String, reason: String },

    #[error("Failed to read worker output: {0}")]
    Stream(String),

    #[error("Failed to wait for worker: {0}")]
    Wait(String),
}
