//! Worker process supervision

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use super::output_log::OutputLog;
use super::readiness::ReadinessLatch;
use pairbot_core::events::{OutputStream, WorkerEvent};
use pairbot_core::prelude::*;

/// How long to wait for the pipe readers after the worker has exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything needed to launch the worker once configuration is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Interpreter or binary to execute
    pub executable: PathBuf,
    /// Arguments (for the review server: the script path)
    pub args: Vec<String>,
    /// Working directory of the child
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    pub fn new(
        executable: impl Into<PathBuf>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            args,
            working_dir: working_dir.into(),
        }
    }

    /// Render as a shell-like command line for logs
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.executable.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Lifecycle state of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Running,
    Exited(Option<i32>),
}

/// A running (or finished) worker child process.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` task that owns
/// it until exit, so the real exit code is captured. `WorkerProcess` keeps a
/// kill channel, a once-set exit code for synchronous state checks, and a
/// [`Notify`] so callers can await exit without polling.
pub struct WorkerProcess {
    pid: Option<u32>,
    /// Consumed by the first `stop()` (or on drop)
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set exactly once by the wait task
    exit_code: Arc<OnceLock<Option<i32>>>,
    exit_notify: Arc<Notify>,
}

impl WorkerProcess {
    /// Spawn the worker described by `spec`.
    ///
    /// Output lines, the one-shot readiness signal and the exit are delivered
    /// on `event_tx`. Every output line is also appended to `output_log`, even
    /// once `event_tx` has no receiver.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the working directory does not exist.
    /// - [`Error::ExecutableNotFound`] if the executable is missing.
    /// - [`Error::ProcessSpawn`] for any other launch failure (e.g. permission denied).
    pub fn spawn(
        spec: &LaunchSpec,
        readiness: ReadinessLatch,
        output_log: OutputLog,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Result<Self> {
        if !spec.working_dir.is_dir() {
            return Err(Error::config(format!(
                "working directory does not exist: {}",
                spec.working_dir.display()
            )));
        }

        if has_path_separator(&spec.executable) && !spec.executable.exists() {
            return Err(Error::ExecutableNotFound {
                path: spec.executable.clone(),
            });
        }

        info!("Spawning worker: {}", spec.display_command());

        let mut child = Command::new(&spec.executable)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ExecutableNotFound {
                        path: spec.executable.clone(),
                    }
                } else {
                    Error::spawn(format!("{}: {}", spec.executable.display(), e))
                }
            })?;

        let pid = child.id();
        info!("Worker process started with PID: {:?}", pid);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn("stdout pipe was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::spawn("stderr pipe was not captured"))?;

        Ok(Self::supervise(
            child,
            pid,
            stdout,
            stderr,
            readiness,
            output_log,
            event_tx,
        ))
    }

    fn supervise(
        child: Child,
        pid: Option<u32>,
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
        readiness: ReadinessLatch,
        output_log: OutputLog,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        let stdout_task = tokio::spawn(Self::stdout_reader(
            stdout,
            event_tx.clone(),
            output_log.clone(),
        ));
        let stderr_task = tokio::spawn(Self::stderr_reader(
            stderr,
            event_tx.clone(),
            output_log,
            readiness,
        ));

        let exit_code = Arc::new(OnceLock::new());
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            [stdout_task, stderr_task],
            event_tx,
            Arc::clone(&exit_code),
            Arc::clone(&exit_notify),
        ));

        Self {
            pid,
            kill_tx: Some(kill_tx),
            exit_code,
            exit_notify,
        }
    }

    /// Background task: owns `child`, waits for it to exit, emits `WorkerEvent::Exited`.
    ///
    /// Ends either when the worker exits on its own or when `kill_rx` fires,
    /// in which case the child is killed and then reaped. `Exited` is sent
    /// only after both pipe readers have drained, so it is always the last
    /// event of a run.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        readers: [JoinHandle<()>; 2],
        event_tx: mpsc::Sender<WorkerEvent>,
        exit_code: Arc<OnceLock<Option<i32>>>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Worker exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for worker: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Stop requested, killing worker");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill worker: {}", e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("Worker killed, exit status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // Record the exit before announcing it so `state()` is already
        // `Exited` when the event is observed.
        let _ = exit_code.set(code);
        exit_notify.notify_waiters();

        // A grandchild may keep the pipes open; don't wait on it forever
        let drain = async {
            for reader in readers {
                let _ = reader.await;
            }
        };
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Worker output pipes still open after exit");
        }

        debug!("Sending WorkerEvent::Exited {{ code: {:?} }}", code);
        let _ = event_tx.send(WorkerEvent::Exited { code }).await;
    }

    async fn stdout_reader(
        stdout: tokio::process::ChildStdout,
        tx: mpsc::Sender<WorkerEvent>,
        output_log: OutputLog,
    ) {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut forwarding = true;

        while let Some(line) = read_lossy_line(&mut reader, &mut buf).await {
            trace!("stdout: {}", line);
            output_log.append(OutputStream::Stdout, &line).await;

            if forwarding && tx.send(WorkerEvent::Stdout(line)).await.is_err() {
                debug!("stdout event channel closed, still logging");
                forwarding = false;
            }
        }

        debug!("stdout reader finished");
    }

    /// Read stderr lines, checking each one against the readiness latch
    async fn stderr_reader(
        stderr: tokio::process::ChildStderr,
        tx: mpsc::Sender<WorkerEvent>,
        output_log: OutputLog,
        mut readiness: ReadinessLatch,
    ) {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        let mut forwarding = true;

        while let Some(line) = read_lossy_line(&mut reader, &mut buf).await {
            trace!("stderr: {}", line);
            output_log.append(OutputStream::Stderr, &line).await;

            let ready = readiness.observe(&line);

            if forwarding && tx.send(WorkerEvent::Stderr(line)).await.is_err() {
                debug!("stderr event channel closed, still logging");
                forwarding = false;
            }

            if ready {
                info!("Worker readiness marker detected");
                if forwarding && tx.send(WorkerEvent::Ready).await.is_err() {
                    forwarding = false;
                }
            }
        }

        debug!("stderr reader finished");
    }

    /// Request termination. Idempotent and non-blocking.
    pub fn stop(&mut self) {
        if self.has_exited() {
            debug!("Worker already exited, nothing to stop");
            return;
        }
        match self.kill_tx.take() {
            Some(tx) => {
                info!("Stopping worker (PID {:?})", self.pid);
                // The wait task may have finished in the meantime
                let _ = tx.send(());
            }
            None => debug!("Stop already requested"),
        }
    }

    /// Wait up to `limit` for the process to exit. Returns `true` if it has.
    pub async fn wait_exit(&self, limit: Duration) -> bool {
        // Create the future before checking, so a notification between the
        // check and the await cannot be missed.
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return true;
        }
        tokio::time::timeout(limit, notified).await.is_ok() || self.has_exited()
    }

    pub fn state(&self) -> WorkerState {
        match self.exit_code.get() {
            Some(code) => WorkerState::Exited(*code),
            None => WorkerState::Running,
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code.get().is_some()
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("WorkerProcess dropped while process may still be running");
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net
        debug!("WorkerProcess dropped");
    }
}

fn has_path_separator(path: &Path) -> bool {
    path.components().count() > 1
}

/// Read one line, replacing invalid UTF-8 instead of failing on it.
///
/// Returns `None` at EOF or on an I/O error.
async fn read_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            Some(String::from_utf8_lossy(buf).into_owned())
        }
        Err(e) => {
            warn!("Failed to read worker output: {}", e);
            None
        }
    }
}
