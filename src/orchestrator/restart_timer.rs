//! One-shot, cancellable restart timer.
//!
//! The timer runs as a background task that sleeps for the configured delay
//! and then invokes its callback, unless the [`CancellationToken`] fires
//! first. Dropping the timer cancels it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

/// A scheduled, cancellable one-shot callback.
#[derive(Debug)]
pub struct RestartTimer {
    delay: Duration,
    cancel: CancellationToken,
}

impl RestartTimer {
    /// Schedule `on_fire` to run after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn schedule<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(
            async move {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!("restart timer cancelled");
                    }
                    () = tokio::time::sleep(delay) => {
                        debug!(?delay, "restart timer fired");
                        on_fire();
                    }
                }
            }
            .instrument(info_span!("restart_timer")),
        );

        Self { delay, cancel }
    }

    /// Delay the timer was scheduled with.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Prevent the callback from running. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RestartTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
