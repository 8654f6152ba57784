//! `scribecast`
//!
//! Transcribes one audio file with whisper.cpp and relays the worker's
//! output to a WebSocket listener as progress, result and error events.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use scribecast_core::config::{self, Config};
use scribecast_core::tracing_init::{default_filter, init_tracing};
use scribecast_relay::transcribe;

#[derive(Parser, Debug)]
#[command(name = "scribecast")]
#[command(version, about = "scribecast - whisper.cpp transcription relay")]
struct Args {
    /// Audio file to transcribe
    audio: PathBuf,

    /// Listener URL events are sent to (e.g. "ws://127.0.0.1:5000/events")
    endpoint: String,

    /// Client identifier stamped on every event
    client_id: String,

    /// Settings file (defaults to ~/.config/scribecast/settings.json)
    #[arg(long, env = "SCRIBECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the whisper.cpp binary
    #[arg(long)]
    worker_bin: Option<PathBuf>,

    /// Path to the whisper.cpp model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// CLI flags take precedence over file and environment settings.
    fn apply_to(&self, config: &mut Config) {
        if let Some(bin) = &self.worker_bin {
            config.worker.binary.clone_from(bin);
        }
        if let Some(model) = &self.model {
            config.worker.model_path.clone_from(model);
        }
        if let Some(level) = &self.log_level {
            config.log.level.clone_from(level);
        }
        if self.log_json {
            config.log.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref()).map(|mut config| {
        args.apply_to(&mut config);
        config
    });
    let (level, json) = match &config {
        Ok(config) => (config.log.level.as_str(), config.log.json),
        Err(_) => (args.log_level.as_deref().unwrap_or("info"), args.log_json),
    };
    init_tracing(&default_filter(level), json);

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Transcription failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: scribecast_core::Result<Config>) -> anyhow::Result<()> {
    let config = config?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        worker = %config.worker.binary.display(),
        model = %config.worker.model_path.display(),
        "Starting scribecast"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_signals(shutdown_tx));

    let report = transcribe(args.audio, args.endpoint, args.client_id, &config, shutdown_rx).await?;
    info!(
        progress = report.progress_events,
        result_bytes = report.result_bytes,
        "Transcription complete"
    );
    Ok(())
}

/// Flip the shutdown channel on Ctrl+C or SIGTERM.
async fn forward_signals(shutdown_tx: watch::Sender<bool>) {
    #[cfg(unix)]
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                None
            }
        };

    #[cfg(unix)]
    let sigterm_future = async {
        match sigterm.as_mut() {
            Some(sigterm) => sigterm.recv().await,
            None => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling transcription");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM, cancelling transcription");
        }
    }
    let _ = shutdown_tx.send(true);
}
