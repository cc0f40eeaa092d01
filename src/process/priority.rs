//! Best-effort priority assignment for spawned processes.

use crate::models::priority::ProcessPriority;
use crate::{AppError, Result};

/// Apply `priority` to the process identified by `pid`.
///
/// [`ProcessPriority::Normal`] is a no-op. On Unix the nice value is set
/// through `renice`, since the process is already running.
///
/// # Errors
///
/// Returns [`AppError::Priority`] if the pid is unknown, `renice` fails, or
/// the platform has no supported mechanism.
pub async fn apply(pid: Option<u32>, priority: ProcessPriority) -> Result<()> {
    if priority == ProcessPriority::Normal {
        return Ok(());
    }
    let pid = pid.ok_or_else(|| AppError::Priority("process has no pid".into()))?;
    renice(pid, priority).await
}

#[cfg(unix)]
async fn renice(pid: u32, priority: ProcessPriority) -> Result<()> {
    let output = tokio::process::Command::new("renice")
        .arg("-n")
        .arg(priority.niceness().to_string())
        .arg("-p")
        .arg(pid.to_string())
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|err| AppError::Priority(format!("failed to run renice: {err}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(AppError::Priority(format!(
            "renice to {priority} failed for pid {pid}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[cfg(not(unix))]
async fn renice(pid: u32, priority: ProcessPriority) -> Result<()> {
    Err(AppError::Priority(format!(
        "setting {priority} priority for pid {pid} is not supported on this platform"
    )))
}
