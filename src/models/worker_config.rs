//! Immutable per-configuration-set worker settings.

use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::events::EventSink;
use crate::models::priority::ProcessPriority;
use crate::models::work_item::{SIGNAL_NAME_PLACEHOLDER, WORK_ITEM_PLACEHOLDER};

/// Delay before restarting a worker whose process exited unexpectedly.
pub const DEFAULT_CRASH_RESTART_DELAY: Duration = Duration::from_secs(10);

/// Delay before starting a worker again after an explicit restart.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(3);

/// Settings shared by every worker built from one configuration set.
///
/// Held behind an `Arc` and never mutated after construction.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Executable launched for each work item.
    pub executable: PathBuf,
    /// Working directory of the spawned process; inherits when `None`.
    pub working_dir: Option<PathBuf>,
    /// Directory receiving one `<name>.log` file per worker.
    pub log_dir: PathBuf,
    /// Append to existing log files instead of truncating them.
    pub log_append: bool,
    /// Priority class applied after spawn.
    pub priority: ProcessPriority,
    /// Argument template; see [`crate::models::work_item::WorkItem::arguments`].
    pub arguments: Vec<String>,
    /// Backoff after an unexpected exit.
    pub crash_restart_delay: Duration,
    /// Backoff after an explicit restart.
    pub restart_delay: Duration,
    /// Write-only destination for log-worthy lifecycle events.
    pub sink: Arc<dyn EventSink>,
}

impl WorkerConfig {
    /// Construct a configuration with default priority, arguments, and delays.
    #[must_use]
    pub fn new(
        executable: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            executable: executable.into(),
            working_dir: None,
            log_dir: log_dir.into(),
            log_append: true,
            priority: ProcessPriority::Normal,
            arguments: default_arguments(),
            crash_restart_delay: DEFAULT_CRASH_RESTART_DELAY,
            restart_delay: DEFAULT_RESTART_DELAY,
            sink,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Choose between append and truncate for worker logs.
    #[must_use]
    pub fn with_log_append(mut self, append: bool) -> Self {
        self.log_append = append;
        self
    }

    /// Set the priority class.
    #[must_use]
    pub fn with_priority(mut self, priority: ProcessPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the argument template.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Override both restart delays.
    #[must_use]
    pub fn with_restart_delays(mut self, crash: Duration, explicit: Duration) -> Self {
        self.crash_restart_delay = crash;
        self.restart_delay = explicit;
        self
    }

    /// Whether the configured executable exists on disk.
    #[must_use]
    pub fn executable_exists(&self) -> bool {
        Path::new(&self.executable).exists()
    }
}

impl Debug for WorkerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("executable", &self.executable)
            .field("working_dir", &self.working_dir)
            .field("log_dir", &self.log_dir)
            .field("log_append", &self.log_append)
            .field("priority", &self.priority)
            .field("arguments", &self.arguments)
            .field("crash_restart_delay", &self.crash_restart_delay)
            .field("restart_delay", &self.restart_delay)
            .finish_non_exhaustive()
    }
}

/// Default argument template: the work item path followed by the signal name.
#[must_use]
pub fn default_arguments() -> Vec<String> {
    vec![
        WORK_ITEM_PLACEHOLDER.to_owned(),
        SIGNAL_NAME_PLACEHOLDER.to_owned(),
    ]
}
