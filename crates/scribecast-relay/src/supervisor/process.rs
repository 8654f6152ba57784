//! Handle to one running transcription worker.
//!
//! Output is consumed in two phases: [`WorkerProcess::next_line`] yields lines
//! while the worker runs, [`WorkerProcess::drain`] collects whatever is still
//! buffered in the pipe once it has stopped.

use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tracing::{debug, info, warn};

use super::manager::SupervisorError;

/// Number of stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Lifecycle of a spawned worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    /// Exited on its own. `code` is `None` when a foreign signal ended it.
    Exited { code: Option<i32> },
    /// Terminated by [`WorkerProcess::kill`].
    Killed,
}

impl WorkerStatus {
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    pub const fn success(self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }
}

/// A running worker, owned by exactly one relay loop.
///
/// Dropping a handle whose worker is still running kills it.
pub struct WorkerProcess {
    child: Child,
    pid: Option<u32>,
    stdout: Lines<BufReader<ChildStdout>>,
    stdout_closed: bool,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    status: WorkerStatus,
    drain_timeout: Duration,
    /// Set when the pipe outlived the worker past the drain timeout,
    /// i.e. a descendant still holds it open.
    lingering: bool,
}

impl WorkerProcess {
    pub(super) fn new(
        mut child: Child,
        binary: &str,
        drain_timeout: Duration,
    ) -> Result<Self, SupervisorError> {
        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::Launch {
                binary: binary.to_string(),
                reason: "Failed to capture stdout".to_string(),
            })?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(pid = ?pid, "worker stderr: {}", line);
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
                debug!(pid = ?pid, "stderr reader finished");
            });
        }

        info!(pid = ?pid, "Worker started");
        Ok(Self {
            child,
            pid,
            stdout: BufReader::new(stdout).lines(),
            stdout_closed: false,
            stderr_tail,
            status: WorkerStatus::Running,
            drain_timeout,
            lingering: false,
        })
    }

    pub const fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Next line of worker output, without its line terminator.
    ///
    /// Returns `Ok(None)` once the worker has exited or closed stdout; from
    /// then on it never blocks. Output still in the pipe at that point is
    /// left for [`drain`](Self::drain).
    pub async fn next_line(&mut self) -> Result<Option<String>, SupervisorError> {
        if self.stdout_closed || !self.status.is_running() {
            return Ok(None);
        }

        tokio::select! {
            biased;
            status = self.child.wait() => {
                let status = status.map_err(|e| SupervisorError::Wait(e.to_string()))?;
                self.record_exit(status);
                Ok(None)
            }
            line = self.stdout.next_line() => match line {
                Ok(Some(line)) => Ok(Some(line)),
                Ok(None) => {
                    debug!(pid = ?self.pid, "Worker closed stdout");
                    self.stdout_closed = true;
                    Ok(None)
                }
                Err(e) => Err(SupervisorError::Stream(e.to_string())),
            },
        }
    }

    /// Read what is left in the stdout pipe, joined with `\n`.
    ///
    /// Bounded by the drain timeout: if a descendant keeps the pipe open,
    /// whatever arrived in time is returned.
    pub async fn drain(&mut self) -> Result<String, SupervisorError> {
        if self.stdout_closed {
            return Ok(String::new());
        }

        let mut remaining = Vec::new();
        let stdout = &mut self.stdout;
        let read_rest = async {
            while let Some(line) = stdout.next_line().await? {
                remaining.push(line);
            }
            Ok::<_, std::io::Error>(())
        };
        let outcome = tokio::time::timeout(self.drain_timeout, read_rest).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SupervisorError::Stream(e.to_string())),
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    lines = remaining.len(),
                    timeout = ?self.drain_timeout,
                    "Worker output still open after drain timeout"
                );
                self.lingering = true;
            }
        }
        self.stdout_closed = true;
        Ok(remaining.join("\n"))
    }

    /// Wait for the worker to terminate.
    pub async fn wait(&mut self) -> Result<WorkerStatus, SupervisorError> {
        if !self.status.is_running() {
            return Ok(self.status);
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SupervisorError::Wait(e.to_string()))?;
        Ok(self.record_exit(status))
    }

    /// Forcibly terminate the worker. Idempotent; a no-op after natural exit
    /// apart from reaping descendants that outlived it.
    pub async fn kill(&mut self) -> Result<(), SupervisorError> {
        if !self.status.is_running() {
            if self.lingering {
                self.signal_group();
                self.lingering = false;
            }
            return Ok(());
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.record_exit(status);
            return Ok(());
        }

        self.signal_group();
        if let Err(e) = self.child.start_kill() {
            debug!(pid = ?self.pid, error = %e, "start_kill failed");
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SupervisorError::Wait(e.to_string()))?;
        self.status = WorkerStatus::Killed;
        info!(pid = ?self.pid, ?status, "Worker killed");
        Ok(())
    }

    /// Most recent stderr lines, oldest first.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record_exit(&mut self, status: ExitStatus) -> WorkerStatus {
        self.status = WorkerStatus::Exited {
            code: status.code(),
        };
        info!(pid = ?self.pid, code = ?status.code(), "Worker exited");
        self.status
    }

    #[cfg(unix)]
    #[allow(unsafe_code, clippy::cast_possible_wrap)]
    fn signal_group(&self) {
        if let Some(pid) = self.pid {
            // SAFETY: the worker was spawned as leader of its own process group
            // (`process_group(0)`), so its pid names a group we created.
            let ret = unsafe { libc::killpg(pid as i32, libc::SIGKILL) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                debug!(pid, error = %err, "killpg failed");
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&self) {}
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.status.is_running() {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            warn!(pid = ?self.pid, "Worker still running on drop, killing");
            self.signal_group();
            let _ = self.child.start_kill();
        } else if self.lingering {
            self.signal_group();
        }
    }
}
