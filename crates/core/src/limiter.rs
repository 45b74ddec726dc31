//! Sliding-window rate limiter

use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Sliding-window admission counter
///
/// Keeps the timestamps of admitted calls that are still inside the window.
/// A call is admissible while fewer than `max_requests` admitted calls are
/// younger than `time_window`.
///
/// Timestamps come from [`tokio::time::Instant`], so the limiter follows a
/// paused Tokio clock in tests.
#[derive(Debug)]
pub struct RateLimiter {
    /// Admission cap per window
    max_requests: usize,
    /// Width of the sliding window
    time_window: Duration,
    /// Admitted call timestamps, oldest first
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` calls per `time_window`
    ///
    /// With `max_requests == 0` nothing is ever admitted.
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        Self {
            max_requests,
            time_window,
            history: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Create a limiter from the `[rate_limit]` config section
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    /// Whether a call made now would be admitted
    ///
    /// Prunes expired history as a side effect.
    pub fn can_make_request(&self) -> bool {
        let mut history = self.history.lock();
        self.prune(&mut history, Instant::now());
        history.len() < self.max_requests
    }

    /// Admit and record a call if the window allows it
    ///
    /// Returns `false` without recording anything when the cap is reached.
    /// A `false` is a normal "not admitted" signal, not an error.
    pub fn record_request(&self) -> bool {
        let now = Instant::now();
        let mut history = self.history.lock();
        self.prune(&mut history, now);

        if history.len() >= self.max_requests {
            debug!(
                in_window = history.len(),
                max_requests = self.max_requests,
                "Rate limit reached, request not admitted"
            );
            return false;
        }

        history.push_back(now);
        trace!(in_window = history.len(), "Request admitted");
        true
    }

    /// Time until the next call would be admitted
    ///
    /// Zero when a call is admissible right now.
    pub fn time_until_next_request(&self) -> Duration {
        let now = Instant::now();
        let mut history = self.history.lock();
        self.prune(&mut history, now);

        if history.len() < self.max_requests {
            return Duration::ZERO;
        }

        match history.front() {
            Some(&oldest) => self
                .time_window
                .saturating_sub(now.saturating_duration_since(oldest)),
            // Only reachable with max_requests == 0
            None => self.time_window,
        }
    }

    /// Number of calls that would still be admitted in the current window
    pub fn remaining(&self) -> usize {
        let mut history = self.history.lock();
        self.prune(&mut history, Instant::now());
        self.max_requests.saturating_sub(history.len())
    }

    /// Forget all recorded calls
    pub fn reset(&self) {
        self.history.lock().clear();
        debug!("Rate limiter history cleared");
    }

    /// Admission cap per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Width of the sliding window
    pub fn time_window(&self) -> Duration {
        self.time_window
    }

    /// Drop entries that are `time_window` old or older
    fn prune(&self, history: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = history.front() {
            if now.saturating_duration_since(oldest) >= self.time_window {
                history.pop_front();
            } else {
                break;
            }
        }
    }
}
