//! Line-oriented output redirection into per-worker log files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Longest line forwarded in one piece; longer output is split into chunks
/// of at most this many bytes.
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Which standard stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Receiver for lines produced by a worker process.
pub trait LineSink: Send + Sync {
    /// Accept one line, without its trailing newline.
    fn write_line(&self, stream: OutputStream, line: &str);
}

/// An append- or truncate-opened log file shared by a worker's output pumps.
///
/// Writes after [`close`](Self::close) are silently dropped.
pub struct LogStream {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl LogStream {
    /// Open `path`, creating it if needed.
    ///
    /// With `append` the existing content is kept; otherwise the file is
    /// truncated.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::LogOpen`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>, append: bool) -> Result<Self> {
        let path = path.into();
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(&path).map_err(|err| {
            AppError::LogOpen(format!("failed to open {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), append, "worker log opened");
        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line and flush it.
    pub fn write_raw(&self, line: &str) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if let Some(writer) = guard.as_mut() {
            if let Err(err) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
                warn!(path = %self.path.display(), %err, "failed to write worker log line");
            }
        }
    }

    /// Flush and close the file. Idempotent.
    pub fn close(&self) {
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(mut writer) = guard.take() {
                let _ = writer.flush();
            }
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.writer.lock().map_or(true, |guard| guard.is_none())
    }
}

impl LineSink for LogStream {
    fn write_line(&self, _stream: OutputStream, line: &str) {
        self.write_raw(line);
    }
}

/// Ensure a log directory exists and is a directory.
///
/// # Errors
///
/// Returns [`AppError::Construction`] if the directory cannot be created.
pub fn ensure_log_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| {
        AppError::Construction(format!(
            "failed to create log directory {}: {err}",
            dir.display()
        ))
    })?;
    if dir.is_dir() {
        Ok(())
    } else {
        Err(AppError::Construction(format!(
            "log path {} is not a directory",
            dir.display()
        )))
    }
}

/// Copy `reader` into `sink` one line at a time until EOF.
///
/// Invalid UTF-8 is replaced rather than aborting the copy.
pub(crate) async fn pump_lines<R>(reader: R, sink: Arc<dyn LineSink>, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    // Set when the previous chunk hit the length cap mid-line.
    let mut split = false;
    loop {
        buf.clear();
        match (&mut reader)
            .take(MAX_LINE_BYTES)
            .read_until(b'\n', &mut buf)
            .await
        {
            Ok(0) => break,
            Ok(_) => {
                let complete = buf.ends_with(b"\n");
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                if !(split && complete && line.is_empty()) {
                    sink.write_line(stream, line);
                }
                split = !complete;
            }
            Err(err) => {
                debug!(?stream, %err, "output pump stopped");
                break;
            }
        }
    }
}
