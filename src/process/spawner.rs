//! Worker process spawner.
//!
//! Spawns one child with piped stdout/stderr and `kill_on_drop(true)`. A
//! background monitor task owns the `Child`: it awaits the exit, performs
//! kills on request, and publishes the exit through a `watch` channel so that
//! any clone of the [`WorkerProcess`] handle can observe it.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::priority::ProcessPriority;
use crate::process::output::{pump_lines, LineSink, OutputStream};
use crate::process::priority;
use crate::{AppError, Result};

/// Time allowed for output pumps to finish after the process exits.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Executable, arguments, and working directory of a process to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    /// Executable path.
    pub program: PathBuf,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Working directory; inherited when `None`.
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    /// Command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Human-readable description of the exit.
    pub reason: String,
}

impl ProcessExit {
    fn from_wait(result: std::io::Result<std::process::ExitStatus>) -> Self {
        match result {
            Ok(status) => {
                let code = status.code();
                let reason = code.map_or_else(
                    || "terminated by signal".to_owned(),
                    |c| format!("exit code {c}"),
                );
                Self { code, reason }
            }
            Err(err) => Self::unknown(format!("wait error: {err}")),
        }
    }

    fn unknown(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }

    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Result of a [`WorkerProcess::kill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// A kill was issued to a live process.
    Killed,
    /// The process had already exited; nothing was done.
    AlreadyExited,
}

/// Handle to one spawned worker process.
///
/// Clones share the same process. Dropping every handle does not kill the
/// process; the monitor task keeps supervising it until it exits.
#[derive(Debug, Clone)]
pub struct WorkerProcess {
    pid: Option<u32>,
    kill_signal: Arc<Notify>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
}

impl WorkerProcess {
    /// Spawn `command`, delivering stdout and stderr lines to `sink`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] if the OS refuses to launch the executable.
    pub fn spawn(command: &ProcessCommand, sink: Arc<dyn LineSink>) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!(
                "failed to spawn {}: {err}",
                command.program.display()
            ))
        })?;
        let pid = child.id();

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_lines(
                stdout,
                Arc::clone(&sink),
                OutputStream::Stdout,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_lines(stderr, sink, OutputStream::Stderr)));
        }

        let kill_signal = Arc::new(Notify::new());
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(monitor(child, pumps, Arc::clone(&kill_signal), exit_tx));

        info!(
            pid = pid.unwrap_or(0),
            program = %command.program.display(),
            "worker process spawned"
        );

        Ok(Self {
            pid,
            kill_signal,
            exit_rx,
        })
    }

    /// OS process id, if the process was still running at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has not yet exited.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Exit details, once the process has exited.
    #[must_use]
    pub fn exit(&self) -> Option<ProcessExit> {
        self.exit_rx.borrow().clone()
    }

    /// Wait up to `timeout` for the process to exit. Never kills.
    ///
    /// Returns `true` if the process has exited.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.exited()).await.is_ok()
    }

    /// Resolve once the process has exited.
    pub async fn exited(&self) -> ProcessExit {
        let mut rx = self.exit_rx.clone();
        let recorded = rx
            .wait_for(Option::is_some)
            .await
            .map(|exit| (*exit).clone());
        match recorded {
            Ok(Some(exit)) => exit,
            Ok(None) => ProcessExit::unknown("exit not recorded"),
            Err(_) => ProcessExit::unknown("exit monitor stopped"),
        }
    }

    /// Forcefully terminate the process.
    ///
    /// Safe to call any number of times and after the process has exited.
    pub fn kill(&self) -> KillOutcome {
        if self.is_alive() {
            self.kill_signal.notify_one();
            KillOutcome::Killed
        } else {
            KillOutcome::AlreadyExited
        }
    }

    /// Apply a priority class to the running process.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Priority`] when the class cannot be applied.
    pub async fn set_priority(&self, class: ProcessPriority) -> Result<()> {
        priority::apply(self.pid, class).await
    }
}

async fn join_pumps(pumps: Vec<JoinHandle<()>>) {
    for pump in pumps {
        let _ = pump.await;
    }
}

/// Own the child until it exits, killing it when asked.
///
/// Output pumps get [`PUMP_DRAIN_TIMEOUT`] to flush buffered lines before the
/// exit is published. A grandchild holding the pipes open cannot delay exit
/// detection past that.
async fn monitor(
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    kill_signal: Arc<Notify>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let result = tokio::select! {
        status = child.wait() => status,
        () = kill_signal.notified() => {
            if let Err(err) = child.start_kill() {
                // The process may have exited between the request and the kill.
                debug!(%err, "kill request on exited process");
            }
            child.wait().await
        }
    };

    let drain = join_pumps(pumps);
    if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, drain).await.is_err() {
        debug!("output pumps still open after process exit");
    }

    let exit = ProcessExit::from_wait(result);
    debug!(reason = %exit.reason, "worker process exited");
    exit_tx.send_replace(Some(exit));
}
