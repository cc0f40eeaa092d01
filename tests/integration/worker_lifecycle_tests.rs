//! Integration tests for the per-worker state machine.
//!
//! Workers run `/bin/sh` scripts with sub-second restart delays so crash and
//! restart paths can be observed without waiting for the production backoff.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use proc_warden::events::MemoryEventSink;
use proc_warden::models::work_item::WorkItem;
use proc_warden::models::worker_config::WorkerConfig;
use proc_warden::models::worker_state::WorkerState;
use proc_warden::orchestrator::worker::{StopOutcome, Worker};
use proc_warden::AppError;

use super::test_helpers::{
    memory_sink, read_log, shell_config, wait_until, work_item, TEST_CRASH_DELAY,
    TEST_RESTART_DELAY,
};

const LONG_RUNNING: &str = "exec sleep 30";

fn shell_worker(dir: &Path, name: &str, script: &str) -> (Worker, Arc<MemoryEventSink>) {
    let (memory, sink) = memory_sink();
    let config = shell_config(&dir.join("logs"), script, sink);
    let worker =
        Worker::new(config, WorkItem::new(work_item(dir, name))).expect("construct worker");
    (worker, memory)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_worker_is_idle_and_creates_log_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-idle", LONG_RUNNING);

    assert_eq!(worker.state(), WorkerState::Idle);
    assert!(worker.pid().is_none());
    assert!(dir.path().join("logs").is_dir());
    assert_eq!(worker.log_path(), dir.path().join("logs").join("lc-idle.log"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_executable_fails_construction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, sink) = memory_sink();
    let config = Arc::new(WorkerConfig::new(
        dir.path().join("no-such-worker"),
        dir.path().join("logs"),
        sink,
    ));
    let result = Worker::new(config, WorkItem::new(work_item(dir.path(), "lc-missing")));
    assert!(matches!(result, Err(AppError::Construction(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_runs_process_and_logs_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-start", "echo hello-from-worker; exec sleep 30");

    worker.start().expect("start");
    assert_eq!(worker.state(), WorkerState::Running);
    assert!(worker.is_process_alive());
    assert!(worker.pid().is_some());
    assert_eq!(worker.starts(), 1);

    let log_path = worker.log_path().to_path_buf();
    assert!(
        wait_until(Duration::from_secs(5), || read_log(&log_path).contains("hello-from-worker")).await,
        "worker output should reach the log"
    );
    assert!(read_log(&log_path).contains("---- lc-start starting /bin/sh"));

    let outcome = worker.stop_process(Duration::ZERO).await;
    assert_eq!(outcome, StopOutcome::Forced);
    worker.wait().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_while_running_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-double", LONG_RUNNING);

    worker.start().expect("first start");
    let second = worker.start();
    assert!(matches!(second, Err(AppError::InvalidState(_))));
    assert_eq!(worker.starts(), 1);

    worker.stop_process(Duration::ZERO).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crash_schedules_delayed_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, memory) = shell_worker(dir.path(), "lc-crash", "exit 3");

    let started = Instant::now();
    worker.start().expect("start");

    assert!(
        wait_until(Duration::from_secs(5), || worker.state() == WorkerState::RestartPending).await,
        "crash should leave the worker pending restart"
    );
    assert!(!worker.is_process_alive());
    assert!(worker.has_pending_restart());
    assert_eq!(worker.starts(), 1, "restart must not be immediate");
    assert_eq!(
        memory.count_containing("lc-crash exited (exit code 3), restarting in 800ms"),
        1
    );

    assert!(
        wait_until(Duration::from_secs(5), || worker.starts() >= 2).await,
        "crashed worker should be restarted"
    );
    assert!(
        started.elapsed() >= TEST_CRASH_DELAY,
        "restart happened before the crash delay"
    );

    worker.stop_process(Duration::ZERO).await;
    assert_eq!(worker.state(), WorkerState::Exited);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_restart_uses_restart_delay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, memory) = shell_worker(dir.path(), "lc-restart", LONG_RUNNING);

    worker.start().expect("start");
    let first_pid = worker.pid();

    let requested = Instant::now();
    worker.restart().expect("restart");
    assert!(
        wait_until(Duration::from_secs(2), || worker.has_pending_restart()).await,
        "killed worker should wait before starting again"
    );
    assert_eq!(worker.state(), WorkerState::RestartPending);
    assert_eq!(worker.starts(), 1);

    assert!(
        wait_until(Duration::from_secs(5), || worker.starts() == 2 && worker.is_process_alive()).await,
        "worker should come back after the restart delay"
    );
    let elapsed = requested.elapsed();
    assert!(elapsed >= TEST_RESTART_DELAY, "restarted too early: {elapsed:?}");
    assert!(
        elapsed < TEST_CRASH_DELAY,
        "explicit restart waited the crash delay: {elapsed:?}"
    );
    assert_ne!(worker.pid(), first_pid);
    assert_eq!(
        memory.count_containing("restarting in"),
        0,
        "explicit restart must not be reported as a crash"
    );

    worker.stop_process(Duration::ZERO).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_of_idle_worker_starts_immediately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-restart-idle", LONG_RUNNING);

    worker.restart().expect("restart idle");
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(worker.starts(), 1);

    worker.stop_process(Duration::ZERO).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_while_pending_starts_now() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-restart-pending", "sleep 0.3; exit 1");

    worker.start().expect("start");
    assert!(wait_until(Duration::from_secs(5), || worker.has_pending_restart()).await);

    worker.restart().expect("restart pending");
    assert_eq!(worker.starts(), 2);
    assert!(!worker.has_pending_restart());

    worker.stop_process(Duration::ZERO).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signal_then_forced_stop_never_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, memory) = shell_worker(dir.path(), "lc-forced", LONG_RUNNING);

    worker.start().expect("start");
    worker.signal_process();
    assert_eq!(worker.state(), WorkerState::GracefulStop);

    let outcome = worker.stop_process(Duration::ZERO).await;
    assert_eq!(outcome, StopOutcome::Forced);
    assert_eq!(worker.state(), WorkerState::Exited);
    assert!(!worker.is_process_alive());

    tokio::time::sleep(TEST_CRASH_DELAY + Duration::from_millis(300)).await;
    assert_eq!(worker.starts(), 1, "stopped worker must never restart");
    assert!(!worker.has_pending_restart());
    assert_eq!(worker.state(), WorkerState::Exited);
    assert!(
        wait_until(Duration::from_secs(3), || memory.count_containing("terminate signal not delivered") == 1).await,
        "signal failure should be reported, not raised"
    );
    assert_eq!(memory.count_containing("restarting in"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_restart_pending_cancels_timer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-stop-pending", "exit 2");

    worker.start().expect("start");
    assert!(wait_until(Duration::from_secs(5), || worker.has_pending_restart()).await);

    let outcome = worker.stop_process(Duration::from_secs(1)).await;
    assert!(matches!(outcome, StopOutcome::NotRunning));
    assert!(!worker.has_pending_restart());

    tokio::time::sleep(TEST_CRASH_DELAY + Duration::from_millis(300)).await;
    assert_eq!(worker.starts(), 1);
    assert_eq!(worker.state(), WorkerState::Exited);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-stop-twice", LONG_RUNNING);

    worker.start().expect("start");
    worker.stop_process(Duration::ZERO).await;
    let second = worker.stop_process(Duration::ZERO).await;
    assert_ne!(second, StopOutcome::Forced);
    assert_eq!(worker.state(), WorkerState::Exited);
    worker.wait().await;
    worker.wait().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_worker_rejects_start_and_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-terminal", LONG_RUNNING);

    worker.start().expect("start");
    worker.stop_process(Duration::ZERO).await;

    assert!(matches!(worker.start(), Err(AppError::InvalidState(_))));
    assert!(matches!(worker.restart(), Err(AppError::InvalidState(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signal_without_process_is_terminal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, memory) = shell_worker(dir.path(), "lc-signal-idle", LONG_RUNNING);

    worker.signal_process();
    assert_eq!(worker.state(), WorkerState::Exited);
    assert!(memory.messages().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn never_both_live_process_and_pending_timer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (memory, sink) = memory_sink();
    let config = Arc::new(
        WorkerConfig::new("/bin/sh", dir.path().join("logs"), sink)
            .with_arguments(vec!["-c".into(), "sleep 0.1; exit 1".into()])
            .with_restart_delays(Duration::from_millis(150), Duration::from_millis(100)),
    );
    let worker = Worker::new(config, WorkItem::new(work_item(dir.path(), "lc-invariant")))
        .expect("construct worker");

    worker.start().expect("start");
    let deadline = Instant::now() + Duration::from_millis(1500);
    while Instant::now() < deadline {
        let snapshot = worker.snapshot();
        assert!(
            !(snapshot.pid.is_some() && snapshot.restart_pending),
            "live process and pending restart at once: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(worker.starts() >= 2, "worker should have cycled");
    assert!(memory.count_containing("restarting in 150ms") >= 1);

    worker.stop_process(Duration::ZERO).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn log_is_shared_across_restarts_and_closed_on_wait() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (worker, _) = shell_worker(dir.path(), "lc-log", "echo run-marker; exit 5");

    worker.start().expect("start");
    assert!(wait_until(Duration::from_secs(5), || worker.starts() >= 2).await);
    worker.stop_process(Duration::from_secs(1)).await;
    worker.wait().await;

    let log = read_log(worker.log_path());
    assert!(log.matches("run-marker").count() >= 2, "{log}");
    assert!(log.contains("exited (exit code 5)"));
}
