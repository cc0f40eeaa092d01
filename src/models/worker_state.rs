//! Worker lifecycle states.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Lifecycle state of a single supervised worker.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, never started.
    Idle,
    /// Spawning the worker process.
    Starting,
    /// Process is live and supervised.
    Running,
    /// Terminate signal sent; waiting for a voluntary exit.
    GracefulStop,
    /// Process is gone and a restart timer is pending.
    RestartPending,
    /// Grace period expired; the process is being killed.
    ForcedStop,
    /// Stopped for good. No further transitions.
    Exited,
}

impl WorkerState {
    /// Whether the worker has been stopped and will never run again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Exited
    }
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::GracefulStop => "graceful_stop",
            Self::RestartPending => "restart_pending",
            Self::ForcedStop => "forced_stop",
            Self::Exited => "exited",
        };
        f.write_str(name)
    }
}
