//! Supervisor: owns every worker and coordinates shutdown.
//!
//! Start is per-item isolated: one bad work item never prevents the others
//! from starting. Stop runs in three phases so the total wall-clock time is bounded by
//! one budget regardless of worker count:
//!
//! 1. Signal every worker without waiting, so all of them begin exiting in
//!    parallel.
//! 2. Fix one deadline, then stop each worker in turn with whatever time is
//!    left before it. Workers still running are killed without waiting.
//! 3. Confirm every killed process has been reaped, all at once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use crate::models::work_item::WorkItem;
use crate::models::worker_config::WorkerConfig;
use crate::orchestrator::worker::{StopOutcome, Worker, WorkerSnapshot};

/// Outcome of [`Supervisor::start_all`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StartReport {
    /// Workers constructed and started.
    pub started: usize,
    /// Work items skipped because their worker could not be constructed.
    pub skipped: usize,
    /// Workers constructed but whose first start failed.
    pub failed: usize,
}

/// Outcome of [`Supervisor::stop_all`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StopReport {
    /// Workers stopped and released.
    pub stopped: usize,
    /// Workers that had to be killed.
    pub forced: usize,
    /// Wall-clock time spent stopping.
    pub elapsed: Duration,
}

/// Owner of the full set of workers for the host's lifetime.
#[derive(Debug, Default)]
pub struct Supervisor {
    workers: Vec<Worker>,
}

impl Supervisor {
    /// Construct a supervisor with no workers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Managed workers, in start order.
    #[must_use]
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Number of managed workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no workers are managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Construct and start one worker per work item.
    ///
    /// Construction and start failures are written to the item's event sink
    /// and never abort the remaining items.
    pub fn start_all<I>(&mut self, work_items: I) -> StartReport
    where
        I: IntoIterator<Item = (Arc<WorkerConfig>, PathBuf)>,
    {
        let mut report = StartReport::default();

        for (config, path) in work_items {
            let sink = Arc::clone(&config.sink);
            let work_item = WorkItem::new(path);

            let worker = match Worker::new(config, work_item.clone()) {
                Ok(worker) => worker,
                Err(err) => {
                    sink.write(&format!(
                        "skipping work item {}: {err}",
                        work_item.path().display()
                    ));
                    report.skipped += 1;
                    continue;
                }
            };

            self.workers.push(worker.clone());
            match worker.start() {
                Ok(()) => report.started += 1,
                Err(err) => {
                    sink.write(&format!("{} failed to start: {err}", worker.name()));
                    report.failed += 1;
                }
            }
        }

        info!(
            started = report.started,
            skipped = report.skipped,
            failed = report.failed,
            "workers started"
        );
        report
    }

    /// Stop every worker within `total_budget`.
    ///
    /// Returns once every process is confirmed gone, forcibly if necessary.
    /// All workers are released afterwards; the supervisor is empty.
    pub async fn stop_all(&mut self, total_budget: Duration) -> StopReport {
        let span = info_span!("stop_all", workers = self.workers.len(), ?total_budget);
        async move {
            let started = Instant::now();

            for worker in &self.workers {
                worker.signal_process();
            }

            let deadline = Instant::now() + total_budget;
            let mut forced = 0usize;
            let mut confirmations = JoinSet::new();
            for worker in &self.workers {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let (outcome, killed) = worker.stop_or_kill(remaining).await;
                if outcome == StopOutcome::Forced {
                    warn!(worker = worker.name(), "worker force-stopped");
                    forced += 1;
                }
                if let Some(process) = killed {
                    let worker = worker.clone();
                    confirmations.spawn(async move { worker.confirm_killed(&process).await });
                }
            }
            // Killed processes are reaped together, not one after another.
            while confirmations.join_next().await.is_some() {}

            let workers = std::mem::take(&mut self.workers);
            for worker in &workers {
                worker.wait().await;
            }

            let report = StopReport {
                stopped: workers.len(),
                forced,
                elapsed: started.elapsed(),
            };
            info!(
                stopped = report.stopped,
                forced = report.forced,
                elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                "all workers stopped"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Explicitly restart every managed worker.
    ///
    /// Returns how many accepted the restart; refusals are logged.
    pub fn restart_all(&self) -> usize {
        let mut restarted = 0;
        for worker in &self.workers {
            match worker.restart() {
                Ok(()) => restarted += 1,
                Err(err) => warn!(worker = worker.name(), %err, "restart refused"),
            }
        }
        info!(restarted, "restart requested for all workers");
        restarted
    }

    /// Status snapshot of every managed worker.
    #[must_use]
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers.iter().map(Worker::snapshot).collect()
    }
}
