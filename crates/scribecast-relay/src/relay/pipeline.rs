//! Event relay pipeline: worker stdout -> typed events -> listener.
//!
//! Data flow:
//! ```text
//! worker stdout (while running) -> progress event per line
//! worker stdout (after exit)    -> one result event
//! launch/stream failure, cancel -> one error event
//! ```
//!
//! Exactly one terminal event (result or error) is sent per job, and the
//! connection is closed exactly once on every path.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use scribecast_core::{Event, Job};

use crate::connection::EventSink;
use crate::supervisor::{ProcessSupervisor, WorkerProcess};

use super::runner::cancelled;
use super::types::{RelayError, RelayReport, RelayState};

/// Relays one worker's output over an open connection.
pub struct EventRelay<S> {
    sink: S,
    client_id: String,
    state: RelayState,
    terminal_sent: bool,
    progress_events: usize,
}

impl<S: EventSink> EventRelay<S> {
    /// Wrap an already open connection.
    pub fn new(sink: S, client_id: impl Into<String>) -> Self {
        Self {
            sink,
            client_id: client_id.into(),
            state: RelayState::Connected,
            terminal_sent: false,
            progress_events: 0,
        }
    }

    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Start the worker for `job` and relay its output until it finishes,
    /// fails, or `shutdown` flips to `true`.
    ///
    /// On failure the worker is killed and, when the connection is still
    /// usable, an error event is sent before closing.
    pub async fn run(
        mut self,
        supervisor: &ProcessSupervisor,
        job: &Job,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RelayReport, RelayError> {
        let mut worker = match supervisor.start(job) {
            Ok(worker) => worker,
            Err(e) => {
                let err = RelayError::Launch(e);
                self.abort(None, &err).await;
                return Err(err);
            }
        };

        self.set_state(RelayState::Streaming);
        match self.stream(&mut worker, &mut shutdown).await {
            Ok(report) => {
                self.set_state(RelayState::Finished);
                info!(
                    client_id = %self.client_id,
                    progress = report.progress_events,
                    result_bytes = report.result_bytes,
                    status = ?report.worker_status,
                    "Transcription relayed"
                );
                self.sink.close().await;
                self.set_state(RelayState::Closed);
                Ok(report)
            }
            Err(err) => {
                self.abort(Some(&mut worker), &err).await;
                Err(err)
            }
        }
    }

    async fn stream(
        &mut self,
        worker: &mut WorkerProcess,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RelayReport, RelayError> {
        loop {
            let line = tokio::select! {
                biased;
                () = cancelled(shutdown) => return Err(RelayError::Cancelled),
                line = worker.next_line() => {
                    line.map_err(|e| RelayError::Stream(e.to_string()))?
                }
            };
            let Some(line) = line else { break };
            info!(client_id = %self.client_id, "{}", line);

            let event = Event::progress(self.client_id.as_str(), line);
            self.transmit(&event).await?;
            self.progress_events += 1;
        }

        let output = worker
            .drain()
            .await
            .map_err(|e| RelayError::Stream(e.to_string()))?;
        let status = tokio::select! {
            biased;
            () = cancelled(shutdown) => return Err(RelayError::Cancelled),
            status = worker.wait() => status.map_err(|e| RelayError::Stream(e.to_string()))?,
        };
        if !status.success() {
            warn!(
                client_id = %self.client_id,
                ?status,
                stderr = ?worker.stderr_tail(),
                "Worker exited unsuccessfully"
            );
        }

        let result_bytes = output.len();
        let event = Event::result(self.client_id.as_str(), output);
        self.transmit(&event).await?;

        Ok(RelayReport {
            progress_events: self.progress_events,
            result_bytes,
            worker_status: status,
        })
    }

    /// Single teardown path for every failure.
    async fn abort(&mut self, worker: Option<&mut WorkerProcess>, err: &RelayError) {
        warn!(client_id = %self.client_id, state = %self.state, error = %err, "Relay failed");
        self.set_state(RelayState::Failed);

        if let Some(worker) = worker {
            if let Err(e) = worker.kill().await {
                warn!(client_id = %self.client_id, error = %e, "Failed to kill worker");
            }
            let stderr = worker.stderr_tail();
            if !stderr.is_empty() {
                warn!(client_id = %self.client_id, ?stderr, "Worker stderr before failure");
            }
        }

        if err.is_reportable() && !self.terminal_sent {
            let event = Event::error(self.client_id.as_str(), err.to_string());
            if let Err(e) = self.transmit(&event).await {
                debug!(client_id = %self.client_id, error = %e, "Error event not delivered");
            }
        }

        self.sink.close().await;
        self.set_state(RelayState::Closed);
    }

    async fn transmit(&mut self, event: &Event) -> Result<(), RelayError> {
        if self.terminal_sent {
            debug!(client_id = %self.client_id, kind = %event.kind, "Dropping event after terminal");
            return Ok(());
        }
        self.sink
            .send(event)
            .await
            .map_err(|e| RelayError::Transmit(e.to_string()))?;
        if event.is_terminal() {
            self.terminal_sent = true;
        }
        Ok(())
    }

    fn set_state(&mut self, state: RelayState) {
        debug!(client_id = %self.client_id, from = %self.state, to = %state, "Relay state");
        self.state = state;
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use scribecast_core::EventKind;

    use super::*;
    use crate::connection::ConnectionError;
    use crate::supervisor::{SupervisorError, WorkerCommand, WorkerStatus};
    use crate::test_support::{audio_fixture, pid_alive, write_worker};

    #[derive(Default)]
    struct Recorded {
        events: Vec<Event>,
        attempts: usize,
        closes: usize,
    }

    /// In-memory sink. `fail_after` makes every send past the first N fail.
    #[derive(Clone, Default)]
    struct RecordingSink {
        recorded: Arc<Mutex<Recorded>>,
        fail_after: Option<usize>,
    }

    impl RecordingSink {
        fn failing_after(n: usize) -> Self {
            Self {
                fail_after: Some(n),
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<Event> {
            self.recorded.lock().unwrap().events.clone()
        }

        fn closes(&self) -> usize {
            self.recorded.lock().unwrap().closes
        }

        fn attempts(&self) -> usize {
            self.recorded.lock().unwrap().attempts
        }
    }

    impl EventSink for RecordingSink {
        async fn send(&mut self, event: &Event) -> Result<(), ConnectionError> {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.attempts += 1;
            if self.fail_after.is_some_and(|n| recorded.attempts > n) {
                return Err(ConnectionError::Transmit("broken pipe".into()));
            }
            recorded.events.push(event.clone());
            Ok(())
        }

        async fn close(&mut self) {
            self.recorded.lock().unwrap().closes += 1;
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        job: Job,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::TempDir::new().unwrap();
            let job = Job::new(audio_fixture(dir.path()), "ws://127.0.0.1:1", "client-1").unwrap();
            Self { dir, job }
        }

        fn supervisor(&self, body: &str) -> ProcessSupervisor {
            let worker = write_worker(self.dir.path(), "worker", body);
            ProcessSupervisor::new(
                WorkerCommand::new(worker, "model.bin"),
                Duration::from_secs(5),
            )
        }

        fn path(&self, name: &str) -> std::path::PathBuf {
            self.dir.path().join(name)
        }
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    fn read_pid(path: &Path) -> u32 {
        for _ in 0..100 {
            if let Ok(raw) = std::fs::read_to_string(path) {
                if let Ok(pid) = raw.trim().parse() {
                    return pid;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("worker never wrote {}", path.display());
    }

    #[tokio::test]
    async fn progress_then_result_scenario() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor(
            "printf '10%%\\n'\nsleep 0.2\nprintf '55%%\\n'\nsleep 0.2\n( sleep 0.3; printf '100%%\\ndone.' ) &\nexit 0",
        );
        let sink = RecordingSink::default();

        let report = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap();

        assert_eq!(
            sink.events(),
            vec![
                Event::progress("client-1", "10%"),
                Event::progress("client-1", "55%"),
                Event::result("client-1", "100%\ndone."),
            ]
        );
        assert_eq!(sink.closes(), 1);
        assert_eq!(report.progress_events, 2);
        assert_eq!(report.result_bytes, "100%\ndone.".len());
        assert_eq!(report.worker_status, WorkerStatus::Exited { code: Some(0) });
    }

    #[tokio::test]
    async fn every_line_becomes_one_progress_event_in_order() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor(
            "for i in 1 2 3 4 5; do echo \"[00:0$i.000] segment $i\"; sleep 0.05; done\nsleep 0.3",
        );
        let sink = RecordingSink::default();

        let report = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 6);
        for (i, event) in events[..5].iter().enumerate() {
            assert_eq!(event.kind, EventKind::Progress);
            assert_eq!(event.payload, format!("[00:0{n}.000] segment {n}", n = i + 1));
            assert_eq!(event.client_id, "client-1");
        }
        assert_eq!(events[5], Event::result("client-1", ""));
        assert_eq!(report.progress_events, 5);
    }

    #[tokio::test]
    async fn silent_worker_yields_empty_result() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor("exit 0");
        let sink = RecordingSink::default();

        let report = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap();

        assert_eq!(sink.events(), vec![Event::result("client-1", "")]);
        assert_eq!(sink.closes(), 1);
        assert_eq!(report.progress_events, 0);
        assert_eq!(report.result_bytes, 0);
    }

    #[tokio::test]
    async fn failed_worker_still_delivers_its_output_as_result() {
        let fx = Fixture::new();
        let supervisor =
            fx.supervisor("echo partial\nsleep 0.2\n( sleep 0.2; printf 'final' ) &\nexit 2");
        let sink = RecordingSink::default();

        let report = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap();

        assert_eq!(
            sink.events(),
            vec![
                Event::progress("client-1", "partial"),
                Event::result("client-1", "final"),
            ]
        );
        assert_eq!(report.worker_status, WorkerStatus::Exited { code: Some(2) });
    }

    #[tokio::test]
    async fn launch_failure_sends_single_error_event() {
        let fx = Fixture::new();
        let supervisor = ProcessSupervisor::new(
            WorkerCommand::new(fx.path("missing-worker"), "model.bin"),
            Duration::from_secs(1),
        );
        let sink = RecordingSink::default();

        let err = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Launch(SupervisorError::Launch { .. })));
        let events = sink.events();
        assert_eq!(kinds(&events), vec![EventKind::Error]);
        assert!(events[0].payload.contains("missing-worker"), "got {}", events[0].payload);
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn transmit_failure_kills_worker_without_error_event() {
        let fx = Fixture::new();
        let pid_file = fx.path("worker.pid");
        let supervisor = fx.supervisor(&format!(
            "echo $$ > '{}'\nwhile true; do echo tick; sleep 0.05; done",
            pid_file.display()
        ));
        let sink = RecordingSink::failing_after(2);

        let started = Instant::now();
        let err = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Transmit(_)), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(kinds(&sink.events()), vec![EventKind::Progress, EventKind::Progress]);
        assert_eq!(sink.attempts(), 3);
        assert_eq!(sink.closes(), 1);
        assert!(!pid_alive(read_pid(&pid_file)));
    }

    #[tokio::test]
    async fn undecodable_output_fails_with_error_event() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor("echo ok\nsleep 0.1\nprintf '\\377\\376\\n'\nsleep 5");
        let sink = RecordingSink::default();

        let err = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Stream(_)), "got {err}");
        let events = sink.events();
        assert_eq!(kinds(&events), vec![EventKind::Progress, EventKind::Error]);
        assert!(events[1].payload.starts_with("Worker output error"));
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn shutdown_kills_worker_and_reports_cancellation() {
        let fx = Fixture::new();
        let pid_file = fx.path("worker.pid");
        let supervisor = fx.supervisor(&format!(
            "echo $$ > '{}'\necho started\nsleep 30",
            pid_file.display()
        ));
        let sink = RecordingSink::default();
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            tx.send(true).ok();
            // Hold the sender until the relay has observed it.
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let started = Instant::now();
        let err = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, rx)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            sink.events(),
            vec![
                Event::progress("client-1", "started"),
                Event::error("client-1", "Transcription cancelled"),
            ]
        );
        assert_eq!(sink.closes(), 1);
        assert!(!pid_alive(read_pid(&pid_file)));
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_does_not_cancel() {
        let fx = Fixture::new();
        let supervisor = fx.supervisor("echo one\nsleep 0.2");
        let sink = RecordingSink::default();
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let report = EventRelay::new(sink.clone(), "client-1")
            .run(&supervisor, &fx.job, rx)
            .await
            .unwrap();

        assert_eq!(report.progress_events, 1);
        assert_eq!(kinds(&sink.events()), vec![EventKind::Progress, EventKind::Result]);
    }

    #[test]
    fn new_relay_starts_connected() {
        let relay = EventRelay::new(RecordingSink::default(), "c");
        assert_eq!(relay.state(), RelayState::Connected);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn relayed_lines_are_logged_at_info() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer({
                let logs = logs.clone();
                move || logs.clone()
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fx = Fixture::new();
        let supervisor =
            fx.supervisor("echo '[00:00.000 --> 00:02.000] hello world'\nsleep 0.2");
        EventRelay::new(RecordingSink::default(), "client-1")
            .run(&supervisor, &fx.job, no_shutdown())
            .await
            .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("[00:00.000 --> 00:02.000] hello world"))
            .unwrap_or_else(|| panic!("line not logged: {output}"));
        assert!(line.contains("INFO"), "got {line}");
    }
}
