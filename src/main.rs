#![forbid(unsafe_code)]

//! `proc-warden`: Worker supervisor host.
//!
//! Loads configuration, discovers work items, starts one worker per item,
//! and stops them all within the configured budget on SIGINT/SIGTERM.
//! On Unix, SIGHUP restarts every worker.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use proc_warden::config::HostConfig;
use proc_warden::discovery;
use proc_warden::events::{EventSink, TracingEventSink};
use proc_warden::orchestrator::supervisor::Supervisor;
use proc_warden::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "proc-warden", about = "Worker process supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("proc-warden bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = HostConfig::load_from_path(&args.config)?;
    info!(
        sets = config.worker_sets.len(),
        stop_budget_ms = config.stop_budget_ms,
        "configuration loaded"
    );

    let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let work_items = discovery::discover(&config, &sink)?;

    let mut supervisor = Supervisor::new();
    let report = supervisor.start_all(work_items);
    info!(
        started = report.started,
        skipped = report.skipped,
        failed = report.failed,
        "supervisor running"
    );

    wait_for_shutdown(&supervisor).await;
    info!("shutdown signal received");

    let report = supervisor.stop_all(config.stop_budget()).await;
    info!(
        stopped = report.stopped,
        forced = report.forced,
        "proc-warden shut down"
    );
    Ok(())
}

/// Block until SIGINT or SIGTERM, restarting all workers on each SIGHUP.
async fn wait_for_shutdown(supervisor: &Supervisor) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sighup) =
            match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(term), Ok(hup)) => (term, hup),
                (Err(err), _) | (_, Err(err)) => {
                    warn!(%err, "failed to register signal handlers, using ctrl-c only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return,
                _ = sigterm.recv() => return,
                _ = sighup.recv() => {
                    info!("SIGHUP received, restarting workers");
                    supervisor.restart_all();
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = supervisor;
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
