//! Work-item discovery.
//!
//! Turns a [`HostConfig`] into the ordered `(WorkerConfig, work item path)`
//! list consumed by [`Supervisor::start_all`](crate::orchestrator::supervisor::Supervisor::start_all).

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use glob::Pattern;
use tracing::{info, info_span};

use crate::config::{HostConfig, ResolvedWorkerSet};
use crate::events::EventSink;
use crate::models::worker_config::WorkerConfig;
use crate::{AppError, Result};

/// Enumerate every work item of every configured worker set.
///
/// A set whose executable does not exist is skipped as a whole, with one
/// event-sink message. Items are ordered by set, then by path.
///
/// # Errors
///
/// Returns `AppError::Config` if a work-item directory is missing or cannot
/// be scanned.
pub fn discover(
    config: &HostConfig,
    sink: &Arc<dyn EventSink>,
) -> Result<Vec<(Arc<WorkerConfig>, PathBuf)>> {
    let _span = info_span!("discover", sets = config.worker_sets.len()).entered();
    let mut items = Vec::new();

    for set in config.resolved_sets() {
        if !set.executable.exists() {
            sink.write(&format!(
                "skipping worker set: executable {} does not exist",
                set.executable.display()
            ));
            continue;
        }

        let worker_config = Arc::new(set.worker_config(Arc::clone(sink)));
        let paths = work_item_paths(&set)?;
        info!(
            executable = %set.executable.display(),
            count = paths.len(),
            "work items found"
        );
        items.extend(paths.into_iter().map(|p| (Arc::clone(&worker_config), p)));
    }

    Ok(items)
}

/// Sorted files in the set's directory with the configured extension.
///
/// Glob metacharacters in the directory and extension match literally.
///
/// # Errors
///
/// Returns `AppError::Config` if the directory is missing or cannot be read,
/// or if an entry cannot be inspected while scanning.
pub fn work_item_paths(set: &ResolvedWorkerSet) -> Result<Vec<PathBuf>> {
    let dir = &set.work_item_dir;
    fs::read_dir(dir).map_err(|err| {
        AppError::Config(format!(
            "cannot scan work item directory {}: {err}",
            dir.display()
        ))
    })?;

    let pattern = PathBuf::from(Pattern::escape(&dir.to_string_lossy()))
        .join(format!("*.{}", Pattern::escape(&set.work_item_extension)));
    let pattern = pattern.to_string_lossy();

    let entries = glob::glob(&pattern).map_err(|err| {
        AppError::Config(format!("invalid work item pattern '{pattern}': {err}"))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| {
            AppError::Config(format!(
                "cannot scan work item directory {}: {err}",
                dir.display()
            ))
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
