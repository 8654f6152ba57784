//! End-to-end job execution: validate, connect, supervise, relay.

use std::path::PathBuf;

use tokio::sync::watch;
use tracing::info;

use scribecast_core::{Config, Job};

use crate::connection::{ConnectionConfig, WsConnection};
use crate::supervisor::ProcessSupervisor;

use super::pipeline::EventRelay;
use super::types::{RelayError, RelayReport};

/// Validate the inputs, then run the job.
///
/// A missing audio file fails here, before any connection is attempted.
pub async fn transcribe(
    audio_path: impl Into<PathBuf>,
    endpoint: impl Into<String>,
    client_id: impl Into<String>,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Result<RelayReport, RelayError> {
    let job = Job::new(audio_path, endpoint, client_id)?;
    run_job(&job, config, shutdown).await
}

/// Run one job: connect, then start the worker and relay its output.
///
/// The worker is only started once the connection is open, so a job whose
/// listener is unreachable never spawns a process.
pub async fn run_job(
    job: &Job,
    config: &Config,
    mut shutdown: watch::Receiver<bool>,
) -> Result<RelayReport, RelayError> {
    info!(
        audio = %job.audio_path().display(),
        endpoint = job.endpoint(),
        client_id = job.client_id(),
        "Starting transcription job"
    );

    let connection_config = ConnectionConfig::from(&config.relay);
    let connection = tokio::select! {
        biased;
        () = cancelled(&mut shutdown) => return Err(RelayError::Cancelled),
        conn = WsConnection::connect(job.endpoint(), &connection_config) => {
            conn.map_err(RelayError::Connect)?
        }
    };

    let supervisor = ProcessSupervisor::from_config(&config.worker);
    EventRelay::new(connection, job.client_id())
        .run(&supervisor, job, shutdown)
        .await
}

/// Resolves once `shutdown` is set to `true`.
///
/// A dropped sender means shutdown can no longer be requested, so this then
/// never resolves.
pub(crate) async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
