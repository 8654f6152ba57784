//! Configuration resolution for scribecast.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (~/.config/scribecast/settings.json, or an explicit path)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Complete scribecast configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// External transcription worker. Binary and model are fixed per
/// installation, never per job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    pub binary: PathBuf,
    pub model_path: PathBuf,
    /// Upper bound on reading leftover output once the worker has exited.
    pub drain_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./whisper.cpp/main"),
            model_path: PathBuf::from("models/ggml-medium.en.bin"),
            drain_timeout_secs: 5,
        }
    }
}

impl WorkerConfig {
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Outbound connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub connect_timeout_secs: u64,
    /// A write that does not complete in time is treated as a dead peer.
    pub write_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            write_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub const fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global settings file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the global settings file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("scribecast").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    debug!(path = %path.display(), "Loading settings file");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `SCRIBECAST_*` overrides. `lookup` abstracts the environment.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("SCRIBECAST_WORKER_BIN").filter(|v| !v.is_empty()) {
        config.worker.binary = PathBuf::from(val);
    }
    if let Some(val) = lookup("SCRIBECAST_MODEL_PATH").filter(|v| !v.is_empty()) {
        config.worker.model_path = PathBuf::from(val);
    }
    if let Some(n) = lookup("SCRIBECAST_DRAIN_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.worker.drain_timeout_secs = n;
    }
    if let Some(n) = lookup("SCRIBECAST_CONNECT_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.relay.connect_timeout_secs = n;
    }
    if let Some(n) = lookup("SCRIBECAST_WRITE_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.relay.write_timeout_secs = n;
    }
    if let Some(val) = lookup("SCRIBECAST_LOG_LEVEL").filter(|v| !v.is_empty()) {
        config.log.level = val;
    }
}
