//! Terminate request delivery and reception.
//!
//! ## Protocol
//!
//! The supervisor connects to the socket named by the worker's identity
//! token and writes one JSON line:
//! ```json
//! {"command": "terminate"}
//! ```
//! and closes the connection. Unknown commands are ignored by the listener.

use std::time::Duration;

use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Command verb carried by a terminate request.
pub const TERMINATE_COMMAND: &str = "terminate";

/// Upper bound on connecting and writing one request.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Wire message sent to a supervised process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalRequest {
    /// Command verb.
    pub command: String,
}

impl SignalRequest {
    /// The terminate request.
    #[must_use]
    pub fn terminate() -> Self {
        Self {
            command: TERMINATE_COMMAND.to_owned(),
        }
    }

    /// Whether this request asks the process to exit.
    #[must_use]
    pub fn is_terminate(&self) -> bool {
        self.command == TERMINATE_COMMAND
    }
}

/// Deliver a terminate request to the process listening on `signal_name`.
///
/// # Errors
///
/// Returns [`AppError::Signal`] if the channel cannot be opened or written
/// within one second. Callers log the error; the timeout-bound kill remains
/// the real stop guarantee.
pub async fn send_terminate(signal_name: &str) -> Result<()> {
    match tokio::time::timeout(DELIVERY_TIMEOUT, deliver(signal_name)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(AppError::Signal(format!(
            "timed out delivering terminate to '{signal_name}'"
        ))),
    }
}

async fn deliver(signal_name: &str) -> Result<()> {
    let name = signal_name
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Signal(format!("invalid signal name '{signal_name}': {err}")))?;

    let mut stream = Stream::connect(name).await.map_err(|err| {
        AppError::Signal(format!(
            "failed to open signal channel '{signal_name}': {err}"
        ))
    })?;

    let mut line = serde_json::to_string(&SignalRequest::terminate())
        .map_err(|err| AppError::Signal(format!("failed to encode request: {err}")))?;
    line.push('\n');

    stream
        .write_all(line.as_bytes())
        .await
        .map_err(|err| AppError::Signal(format!("failed to write to '{signal_name}': {err}")))?;
    stream
        .flush()
        .await
        .map_err(|err| AppError::Signal(format!("failed to flush '{signal_name}': {err}")))?;

    debug!(signal_name, "terminate request delivered");
    Ok(())
}

/// Worker-side listener for terminate requests.
pub struct TerminateListener {
    signal_name: String,
    listener: Listener,
}

impl TerminateListener {
    /// Bind the local socket named `signal_name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signal`] if the name is invalid or already bound.
    pub fn bind(signal_name: &str) -> Result<Self> {
        let name = signal_name
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| {
                AppError::Signal(format!("invalid signal name '{signal_name}': {err}"))
            })?;

        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .map_err(|err| {
                AppError::Signal(format!(
                    "failed to bind signal channel '{signal_name}': {err}"
                ))
            })?;

        info!(signal_name, "listening for terminate requests");
        Ok(Self {
            signal_name: signal_name.to_owned(),
            listener,
        })
    }

    /// Name this listener is bound to.
    #[must_use]
    pub fn signal_name(&self) -> &str {
        &self.signal_name
    }

    /// Resolve when a terminate request arrives.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signal`] if accepting a connection fails.
    pub async fn recv(&self) -> Result<()> {
        loop {
            let stream = self
                .listener
                .accept()
                .await
                .map_err(|err| AppError::Signal(format!("accept failed: {err}")))?;

            if read_request(stream).await {
                info!(signal_name = %self.signal_name, "terminate requested");
                return Ok(());
            }
        }
    }
}

async fn read_request(stream: Stream) -> bool {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => false,
        Ok(_) => match serde_json::from_str::<SignalRequest>(line.trim()) {
            Ok(request) => request.is_terminate(),
            Err(err) => {
                warn!(%err, "ignoring malformed signal request");
                false
            }
        },
        Err(err) => {
            warn!(%err, "signal channel read error");
            false
        }
    }
}
