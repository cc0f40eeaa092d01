//! Host configuration parsing, layering, and validation.
//!
//! Values resolve in three layers: a `[[worker_set]]` entry, then the
//! `[defaults]` table, then the built-in default. The stop budget can also be
//! overridden from the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::events::EventSink;
use crate::models::priority::ProcessPriority;
use crate::models::worker_config::{
    default_arguments, WorkerConfig, DEFAULT_CRASH_RESTART_DELAY, DEFAULT_RESTART_DELAY,
};
use crate::{AppError, Result};

/// Environment variable overriding [`HostConfig::stop_budget_ms`].
pub const STOP_BUDGET_ENV: &str = "PROC_WARDEN_STOP_BUDGET_MS";

fn default_stop_budget_ms() -> u64 {
    2500
}

/// Fallback values shared by every worker set.
///
/// Every field is optional; a missing field falls through to the built-in
/// default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct WorkerDefaults {
    /// Work-item file extension, without the leading dot.
    pub work_item_extension: Option<String>,
    /// Working directory of spawned processes.
    pub working_dir: Option<PathBuf>,
    /// Directory for worker output logs.
    pub log_dir: Option<PathBuf>,
    /// Append to existing logs instead of truncating.
    pub log_append: Option<bool>,
    /// Priority class.
    pub priority: Option<ProcessPriority>,
    /// Argument template.
    pub arguments: Option<Vec<String>>,
    /// Seconds before restarting a crashed worker.
    pub crash_restart_seconds: Option<u64>,
    /// Seconds before starting a worker after an explicit restart.
    pub restart_delay_seconds: Option<u64>,
}

/// One configuration set: an executable run once per work item found.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct WorkerSetConfig {
    /// Executable launched for each work item.
    pub executable: PathBuf,
    /// Directory scanned for work-item files.
    pub work_item_dir: PathBuf,
    /// Work-item file extension, without the leading dot.
    pub work_item_extension: Option<String>,
    /// Working directory of spawned processes.
    pub working_dir: Option<PathBuf>,
    /// Directory for worker output logs.
    pub log_dir: Option<PathBuf>,
    /// Append to existing logs instead of truncating.
    pub log_append: Option<bool>,
    /// Priority class.
    pub priority: Option<ProcessPriority>,
    /// Argument template.
    pub arguments: Option<Vec<String>>,
    /// Seconds before restarting a crashed worker.
    pub crash_restart_seconds: Option<u64>,
    /// Seconds before starting a worker after an explicit restart.
    pub restart_delay_seconds: Option<u64>,
}

/// Fully resolved settings for one worker set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkerSet {
    /// Executable launched for each work item.
    pub executable: PathBuf,
    /// Directory scanned for work-item files.
    pub work_item_dir: PathBuf,
    /// Work-item file extension, without the leading dot.
    pub work_item_extension: String,
    /// Working directory of spawned processes.
    pub working_dir: Option<PathBuf>,
    /// Directory for worker output logs.
    pub log_dir: PathBuf,
    /// Append to existing logs instead of truncating.
    pub log_append: bool,
    /// Priority class.
    pub priority: ProcessPriority,
    /// Argument template.
    pub arguments: Vec<String>,
    /// Backoff after an unexpected exit.
    pub crash_restart_delay: Duration,
    /// Backoff after an explicit restart.
    pub restart_delay: Duration,
}

impl ResolvedWorkerSet {
    /// Build the shared [`WorkerConfig`] for this set.
    #[must_use]
    pub fn worker_config(&self, sink: Arc<dyn EventSink>) -> WorkerConfig {
        let mut config = WorkerConfig::new(&self.executable, &self.log_dir, sink)
            .with_log_append(self.log_append)
            .with_priority(self.priority)
            .with_arguments(self.arguments.clone())
            .with_restart_delays(self.crash_restart_delay, self.restart_delay);
        if let Some(ref dir) = self.working_dir {
            config = config.with_working_dir(dir);
        }
        config
    }
}

/// Host configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct HostConfig {
    /// Total time allowed for stopping every worker.
    #[serde(default = "default_stop_budget_ms")]
    pub stop_budget_ms: u64,
    /// Fallback values for every worker set.
    #[serde(default)]
    pub defaults: WorkerDefaults,
    /// Configured worker sets, in start order.
    #[serde(default, rename = "worker_set")]
    pub worker_sets: Vec<WorkerSetConfig>,
}

impl HostConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, apply environment overrides,
    /// and validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Total stop budget.
    #[must_use]
    pub fn stop_budget(&self) -> Duration {
        Duration::from_millis(self.stop_budget_ms)
    }

    /// Resolve every worker set against `[defaults]` and built-in defaults.
    #[must_use]
    pub fn resolved_sets(&self) -> Vec<ResolvedWorkerSet> {
        self.worker_sets
            .iter()
            .map(|set| self.resolve(set))
            .collect()
    }

    fn resolve(&self, set: &WorkerSetConfig) -> ResolvedWorkerSet {
        let defaults = &self.defaults;
        let extension = set
            .work_item_extension
            .clone()
            .or_else(|| defaults.work_item_extension.clone())
            .unwrap_or_else(|| "conf".to_owned());

        ResolvedWorkerSet {
            executable: set.executable.clone(),
            work_item_dir: set.work_item_dir.clone(),
            work_item_extension: extension.trim_start_matches('.').to_owned(),
            working_dir: set
                .working_dir
                .clone()
                .or_else(|| defaults.working_dir.clone()),
            log_dir: set
                .log_dir
                .clone()
                .or_else(|| defaults.log_dir.clone())
                .unwrap_or_else(|| set.work_item_dir.join("logs")),
            log_append: set.log_append.or(defaults.log_append).unwrap_or(true),
            priority: set.priority.or(defaults.priority).unwrap_or_default(),
            arguments: set
                .arguments
                .clone()
                .or_else(|| defaults.arguments.clone())
                .unwrap_or_else(default_arguments),
            crash_restart_delay: set
                .crash_restart_seconds
                .or(defaults.crash_restart_seconds)
                .map_or(DEFAULT_CRASH_RESTART_DELAY, Duration::from_secs),
            restart_delay: set
                .restart_delay_seconds
                .or(defaults.restart_delay_seconds)
                .map_or(DEFAULT_RESTART_DELAY, Duration::from_secs),
        }
    }

    fn apply_env_overrides(&mut self) {
        let Ok(raw) = env::var(STOP_BUDGET_ENV) else {
            return;
        };
        match raw.trim().parse::<u64>() {
            Ok(value) => self.stop_budget_ms = value,
            Err(err) => {
                warn!(var = STOP_BUDGET_ENV, value = %raw, %err, "ignoring invalid override");
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.worker_sets.is_empty() {
            return Err(AppError::Config(
                "at least one [[worker_set]] must be configured".into(),
            ));
        }

        for set in self.resolved_sets() {
            if set.work_item_extension.is_empty() {
                return Err(AppError::Config(format!(
                    "work_item_extension must not be empty for {}",
                    set.executable.display()
                )));
            }
            if set.crash_restart_delay.is_zero() || set.restart_delay.is_zero() {
                return Err(AppError::Config(format!(
                    "restart delays must be greater than zero for {}",
                    set.executable.display()
                )));
            }
        }

        Ok(())
    }
}
