//! Per-worker lifecycle state machine.
//!
//! A [`Worker`] owns at most one [`WorkerProcess`] and at most one
//! [`RestartTimer`] at a time, never both once its exit has been handled.
//! Every deliberate termination records an [`ExitIntent`] under the worker
//! lock *before* the signal or kill is issued; the exit callback branches on
//! that intent, so an intentional exit is never mistaken for a crash.
//!
//! | Exit intent | Exit callback                                   |
//! |-------------|-------------------------------------------------|
//! | `None`      | crash: restart after `crash_restart_delay`      |
//! | `Restart`   | restart after `restart_delay`                   |
//! | `Stop`      | terminal: `Exited`                              |

use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ipc::terminate::send_terminate;
use crate::models::priority::ProcessPriority;
use crate::models::work_item::WorkItem;
use crate::models::worker_config::WorkerConfig;
use crate::models::worker_state::WorkerState;
use crate::orchestrator::restart_timer::RestartTimer;
use crate::process::output::{ensure_log_dir, LineSink, LogStream};
use crate::process::{KillOutcome, ProcessCommand, ProcessExit, WorkerProcess};
use crate::{AppError, Result};

/// Upper bound on waiting for a killed process to be reaped.
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// What the next process exit means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitIntent {
    /// No termination requested; an exit is a crash.
    None,
    /// Killed by [`Worker::restart`].
    Restart,
    /// Stop requested; never restart.
    Stop,
}

/// How [`Worker::stop_process`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No process was running.
    NotRunning,
    /// The process exited on its own within the timeout.
    Graceful,
    /// The process had to be killed.
    Forced,
}

/// Point-in-time view of a worker for status reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkerSnapshot {
    /// Worker name.
    pub name: String,
    /// Identity token addressed by the terminate signal.
    pub signal_name: String,
    /// Lifecycle state.
    pub state: WorkerState,
    /// Pid of the live process, if any.
    pub pid: Option<u32>,
    /// Successful starts so far.
    pub starts: u64,
    /// Whether a restart timer is pending.
    pub restart_pending: bool,
}

struct Core {
    state: WorkerState,
    intent: ExitIntent,
    process: Option<WorkerProcess>,
    restart_timer: Option<RestartTimer>,
    /// Incremented per spawn; exit callbacks for older processes are ignored.
    generation: u64,
    /// Incremented per scheduled timer; superseded timers are ignored.
    timer_seq: u64,
    log: Option<Arc<LogStream>>,
    starts: u64,
}

struct Shared {
    config: Arc<WorkerConfig>,
    work_item: WorkItem,
    log_path: PathBuf,
    core: Mutex<Core>,
}

/// Supervising state machine for one work item.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Worker {
    shared: Arc<Shared>,
}

impl Worker {
    /// Construct a worker without starting it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Construction`] if the executable does not exist or
    /// the log directory cannot be created.
    pub fn new(config: Arc<WorkerConfig>, work_item: WorkItem) -> Result<Self> {
        if !config.executable_exists() {
            return Err(AppError::Construction(format!(
                "executable {} does not exist",
                config.executable.display()
            )));
        }
        ensure_log_dir(&config.log_dir)?;
        let log_path = config.log_dir.join(work_item.log_file_name());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                work_item,
                log_path,
                core: Mutex::new(Core {
                    state: WorkerState::Idle,
                    intent: ExitIntent::None,
                    process: None,
                    restart_timer: None,
                    generation: 0,
                    timer_seq: 0,
                    log: None,
                    starts: 0,
                }),
            }),
        })
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.work_item.name()
    }

    /// The work item this worker supervises.
    #[must_use]
    pub fn work_item(&self) -> &WorkItem {
        &self.shared.work_item
    }

    /// Path of the worker's output log.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.shared.log_path
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.lock().state
    }

    /// Pid of the live process, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock()
            .process
            .as_ref()
            .filter(|p| p.is_alive())
            .and_then(WorkerProcess::pid)
    }

    /// Whether a live process is attached.
    #[must_use]
    pub fn is_process_alive(&self) -> bool {
        self.lock()
            .process
            .as_ref()
            .is_some_and(WorkerProcess::is_alive)
    }

    /// Whether a restart timer is pending.
    #[must_use]
    pub fn has_pending_restart(&self) -> bool {
        self.lock()
            .restart_timer
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Number of successful starts.
    #[must_use]
    pub fn starts(&self) -> u64 {
        self.lock().starts
    }

    /// Status snapshot.
    #[must_use]
    pub fn snapshot(&self) -> WorkerSnapshot {
        let core = self.lock();
        WorkerSnapshot {
            name: self.name().to_owned(),
            signal_name: self.shared.work_item.signal_name().to_owned(),
            state: core.state,
            pid: core
                .process
                .as_ref()
                .filter(|p| p.is_alive())
                .and_then(WorkerProcess::pid),
            starts: core.starts,
            restart_pending: core
                .restart_timer
                .as_ref()
                .is_some_and(|t| !t.is_cancelled()),
        }
    }

    /// Spawn the worker process.
    ///
    /// Valid from `Idle` and `RestartPending`; a pending restart timer is
    /// cancelled first.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidState`] if the worker is stopped or already running.
    /// - [`AppError::LogOpen`] if the log file cannot be opened.
    /// - [`AppError::Spawn`] if the process cannot be launched.
    pub fn start(&self) -> Result<()> {
        let mut core = self.lock();
        if core.state.is_terminal() || core.intent == ExitIntent::Stop {
            return Err(AppError::InvalidState(format!(
                "{} has been stopped",
                self.name()
            )));
        }
        if core.process.as_ref().is_some_and(WorkerProcess::is_alive) {
            return Err(AppError::InvalidState(format!(
                "{} is already running",
                self.name()
            )));
        }
        self.start_locked(&mut core)
    }

    /// Request a graceful exit through the out-of-band terminate signal.
    ///
    /// Cancels any pending restart and marks the next exit as intentional
    /// before the signal is sent. Delivery happens on a background task and
    /// failures only reach the event sink.
    pub fn signal_process(&self) {
        let mut core = self.lock();
        Self::cancel_timer(&mut core);
        core.intent = ExitIntent::Stop;

        let alive = core.process.as_ref().is_some_and(WorkerProcess::is_alive);
        if !alive {
            if core.process.is_none() {
                core.state = WorkerState::Exited;
            }
            return;
        }
        core.state = WorkerState::GracefulStop;
        drop(core);

        let signal_name = self.shared.work_item.signal_name().to_owned();
        let name = self.name().to_owned();
        let sink = Arc::clone(&self.shared.config.sink);
        tokio::spawn(async move {
            if let Err(err) = send_terminate(&signal_name).await {
                sink.write(&format!("{name}: terminate signal not delivered: {err}"));
            }
        });
    }

    /// Stop the worker for good, killing the process if it outlives `timeout`.
    ///
    /// Never fails: an already-exited process is simply recorded as stopped.
    pub async fn stop_process(&self, timeout: Duration) -> StopOutcome {
        let (outcome, killed) = self.stop_or_kill(timeout).await;
        if let Some(process) = killed {
            self.confirm_killed(&process).await;
        }
        outcome
    }

    /// First half of [`stop_process`](Self::stop_process): wait up to
    /// `timeout`, then issue a kill without waiting for the process to be
    /// reaped.
    ///
    /// Returns the killed process when one still has to be confirmed with
    /// [`confirm_killed`](Self::confirm_killed).
    pub(crate) async fn stop_or_kill(
        &self,
        timeout: Duration,
    ) -> (StopOutcome, Option<WorkerProcess>) {
        let process = {
            let mut core = self.lock();
            Self::cancel_timer(&mut core);
            core.intent = ExitIntent::Stop;
            match core.process.clone() {
                Some(process) => process,
                None => {
                    core.state = WorkerState::Exited;
                    return (StopOutcome::NotRunning, None);
                }
            }
        };

        if process.wait_for_exit(timeout).await {
            self.finish_stop();
            return (StopOutcome::Graceful, None);
        }

        {
            let mut core = self.lock();
            if !core.state.is_terminal() {
                core.state = WorkerState::ForcedStop;
            }
        }
        warn!(worker = self.name(), ?timeout, "worker did not exit in time, killing");

        match process.kill() {
            KillOutcome::Killed => (StopOutcome::Forced, Some(process)),
            KillOutcome::AlreadyExited => {
                self.finish_stop();
                (StopOutcome::Graceful, None)
            }
        }
    }

    /// Wait up to [`KILL_CONFIRM_TIMEOUT`] for a killed process to be reaped,
    /// then record the worker as stopped.
    pub(crate) async fn confirm_killed(&self, process: &WorkerProcess) {
        if !process.wait_for_exit(KILL_CONFIRM_TIMEOUT).await {
            warn!(worker = self.name(), "killed worker has not been reaped");
        }
        self.finish_stop();
    }

    /// Kill and restart the process after the explicit-restart delay.
    ///
    /// With no live process the worker starts immediately.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidState`] once a stop has been requested, or
    /// the start error when an immediate start fails.
    pub fn restart(&self) -> Result<()> {
        let mut core = self.lock();
        if core.state.is_terminal() || core.intent == ExitIntent::Stop {
            return Err(AppError::InvalidState(format!(
                "{} is stopping or stopped",
                self.name()
            )));
        }
        Self::cancel_timer(&mut core);

        let Some(process) = core.process.clone() else {
            return self.start_locked(&mut core);
        };

        core.intent = ExitIntent::Restart;
        match process.kill() {
            KillOutcome::Killed => {
                info!(
                    worker = self.name(),
                    delay = ?self.shared.config.restart_delay,
                    "restart requested, process killed"
                );
                Ok(())
            }
            KillOutcome::AlreadyExited => {
                debug!(worker = self.name(), "restart found process gone, starting now");
                core.process = None;
                self.start_locked(&mut core)
            }
        }
    }

    /// Wait for the process to exit, then close the log stream.
    pub async fn wait(&self) {
        let process = self.lock().process.clone();
        if let Some(process) = process {
            let _ = process.exited().await;
        }
        let log = self.lock().log.take();
        if let Some(log) = log {
            log.close();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_timer(core: &mut Core) {
        if let Some(timer) = core.restart_timer.take() {
            timer.cancel();
        }
    }

    fn start_locked(&self, core: &mut Core) -> Result<()> {
        Self::cancel_timer(core);
        core.state = WorkerState::Starting;
        let config = &self.shared.config;

        // Opened once; later restarts keep appending to the same stream.
        let log = if let Some(log) = core.log.clone() {
            log
        } else {
            match LogStream::open(&self.shared.log_path, config.log_append) {
                Ok(log) => {
                    let log = Arc::new(log);
                    core.log = Some(Arc::clone(&log));
                    log
                }
                Err(err) => {
                    core.state = WorkerState::Idle;
                    return Err(err);
                }
            }
        };

        let mut command = ProcessCommand::new(&config.executable)
            .args(self.shared.work_item.arguments(&config.arguments));
        if let Some(ref dir) = config.working_dir {
            command = command.current_dir(dir);
        }

        log.write_raw(&format!(
            "---- {} starting {} at {}",
            self.name(),
            config.executable.display(),
            Local::now().to_rfc3339()
        ));

        let sink: Arc<dyn LineSink> = Arc::clone(&log) as Arc<dyn LineSink>;
        let process = match WorkerProcess::spawn(&command, sink) {
            Ok(process) => process,
            Err(err) => {
                core.state = WorkerState::Idle;
                return Err(err);
            }
        };

        core.generation += 1;
        core.intent = ExitIntent::None;
        core.process = Some(process.clone());
        core.starts += 1;
        core.state = WorkerState::Running;

        info!(
            worker = self.name(),
            pid = process.pid().unwrap_or(0),
            starts = core.starts,
            "worker started"
        );

        self.watch_exit(process.clone(), core.generation);
        if config.priority != ProcessPriority::Normal {
            self.apply_priority(process);
        }
        Ok(())
    }

    fn watch_exit(&self, process: WorkerProcess, generation: u64) {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let exit = process.exited().await;
            if let Some(worker) = Self::upgrade(&weak) {
                worker.on_process_exit(generation, &exit);
            }
        });
    }

    fn apply_priority(&self, process: WorkerProcess) {
        let priority = self.shared.config.priority;
        let sink = Arc::clone(&self.shared.config.sink);
        let name = self.name().to_owned();
        tokio::spawn(async move {
            if let Err(err) = process.set_priority(priority).await {
                sink.write(&format!("{name}: failed to set priority {priority}: {err}"));
            }
        });
    }

    fn on_process_exit(&self, generation: u64, exit: &ProcessExit) {
        let mut core = self.lock();
        if core.generation != generation {
            debug!(worker = self.name(), generation, "ignoring exit of replaced process");
            return;
        }
        core.process = None;
        if let Some(ref log) = core.log {
            log.write_raw(&format!("---- {} exited ({})", self.name(), exit.reason));
        }

        match core.intent {
            ExitIntent::Stop => {
                core.state = WorkerState::Exited;
                info!(worker = self.name(), reason = %exit.reason, "worker stopped");
            }
            ExitIntent::Restart => {
                core.intent = ExitIntent::None;
                let delay = self.shared.config.restart_delay;
                self.schedule_restart(&mut core, delay);
                info!(worker = self.name(), ?delay, "worker restarting");
            }
            ExitIntent::None => {
                let delay = self.shared.config.crash_restart_delay;
                self.schedule_restart(&mut core, delay);
                self.shared.config.sink.write(&format!(
                    "{} exited ({}), restarting in {}",
                    self.name(),
                    exit.reason,
                    format_delay(delay)
                ));
            }
        }
    }

    fn schedule_restart(&self, core: &mut Core, delay: Duration) {
        Self::cancel_timer(core);
        core.timer_seq += 1;
        let seq = core.timer_seq;
        let weak = Arc::downgrade(&self.shared);
        core.restart_timer = Some(RestartTimer::schedule(delay, move || {
            if let Some(worker) = Self::upgrade(&weak) {
                worker.on_timer_fired(seq);
            }
        }));
        core.state = WorkerState::RestartPending;
    }

    fn on_timer_fired(&self, seq: u64) {
        let mut core = self.lock();
        let current = core
            .restart_timer
            .as_ref()
            .is_some_and(|t| !t.is_cancelled());
        if core.timer_seq != seq || !current || core.intent == ExitIntent::Stop {
            debug!(worker = self.name(), seq, "ignoring superseded restart timer");
            return;
        }
        core.restart_timer = None;

        if let Err(err) = self.start_locked(&mut core) {
            let delay = self.shared.config.crash_restart_delay;
            self.shared.config.sink.write(&format!(
                "{} failed to restart: {err}; retrying in {}",
                self.name(),
                format_delay(delay)
            ));
            self.schedule_restart(&mut core, delay);
        }
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn finish_stop(&self) {
        let mut core = self.lock();
        Self::cancel_timer(&mut core);
        core.state = WorkerState::Exited;
    }
}

impl Debug for Worker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        format!("{}s", delay.as_secs())
    } else {
        format!("{}ms", delay.as_millis())
    }
}
