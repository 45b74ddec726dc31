//! Cancellable one-shot timers on the Tokio clock

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Handle to a callback scheduled to run once after a delay
///
/// Dropping the handle cancels the callback if it has not started yet.
/// A callback that is already running is never interrupted.
#[derive(Debug)]
pub struct Timer {
    handle: Option<JoinHandle<()>>,
    deadline: Instant,
}

impl Timer {
    /// Run `callback` once after `delay`
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn schedule<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            callback();
        });

        Self {
            handle: Some(handle),
            deadline,
        }
    }

    /// When the callback is due
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the callback is due
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the callback has run (or was cancelled)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancel the callback if it has not started
    pub fn cancel(self) {
        drop(self);
    }

    /// Release the handle without cancelling
    ///
    /// Called from inside the timer's own callback when the owner clears its
    /// slot, so the running task is not asked to abort itself.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
