//! Write-only event sink for supervisor lifecycle messages.
//!
//! The core reports spawn failures, crash restarts, signal delivery
//! failures, and priority failures as one line each. [`TracingEventSink`]
//! forwards those lines to `tracing`; [`MemoryEventSink`] keeps them in
//! memory for hosts that surface them elsewhere.

use std::sync::Mutex;

use tracing::info;

/// Destination for one-line lifecycle events.
pub trait EventSink: Send + Sync {
    /// Record a single event message.
    fn write(&self, message: &str);
}

/// Event sink that emits every message as an `info` tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn write(&self, message: &str) {
        info!(target: "proc_warden::events", "{message}");
    }
}

/// Event sink that retains messages in insertion order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    messages: Mutex<Vec<String>>,
}

impl MemoryEventSink {
    /// Construct an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every message written so far.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of messages containing `needle`.
    #[must_use]
    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn write(&self, message: &str) {
        info!(target: "proc_warden::events", "{message}");
        if let Ok(mut guard) = self.messages.lock() {
            guard.push(message.to_owned());
        }
    }
}
