//! Rate capping with a guaranteed trailing call
//!
//! A throttled operation runs at most once per interval. A call arriving
//! inside the interval is not dropped: it becomes the single trailing
//! invocation, due when the interval expires, and later calls in the same
//! interval only replace its arguments.

use crate::timer::Timer;
use crate::{Downgrade, Operation, Unschedule};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Throttle `operation` to one invocation per `interval`
pub fn throttle<A, F>(operation: F, interval: Duration) -> Throttled<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Throttled {
        inner: Arc::new(Inner {
            operation: Box::new(operation),
            interval,
            state: Mutex::new(State {
                last_fired: None,
                pending: None,
                timer: None,
                generation: 0,
            }),
        }),
    }
}

/// Throttled trigger for an operation taking `A`
pub struct Throttled<A> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    operation: Operation<A>,
    interval: Duration,
    state: Mutex<State<A>>,
}

struct State<A> {
    /// When the operation last actually ran
    last_fired: Option<Instant>,
    /// Arguments for the trailing invocation
    pending: Option<A>,
    /// Trailing invocation, due at `last_fired + interval`
    timer: Option<Timer>,
    generation: u64,
}

impl<A> Clone for Throttled<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Throttled<A> {
    /// Invoke now if the interval has elapsed, otherwise (re)arm the
    /// trailing invocation with `args`
    pub fn call(&self, args: A) {
        let now = Instant::now();
        let mut state = self.inner.state.lock();

        let elapsed = state.last_fired.map(|last| now.saturating_duration_since(last));
        let ready = elapsed.map_or(true, |elapsed| elapsed >= self.inner.interval);

        if ready {
            state.last_fired = Some(now);
            state.pending = None;
            state.timer = None;
            state.generation += 1;
            drop(state);

            trace!("Throttle fired immediately");
            (self.inner.operation)(args);
            return;
        }

        state.pending = Some(args);

        if state.timer.is_none() {
            let wait = self.inner.interval - elapsed.unwrap_or_default();
            let generation = state.generation;
            let weak = Arc::downgrade(&self.inner);
            state.timer = Some(Timer::schedule(wait, move || Inner::fire(&weak, generation)));
            trace!(wait = ?wait, "Throttle trailing call scheduled");
        } else {
            trace!("Throttle trailing arguments replaced");
        }
    }

    /// Run the trailing invocation now, if one is scheduled
    pub fn flush(&self) {
        let args = {
            let mut state = self.inner.state.lock();
            state.timer = None;
            let args = state.pending.take();
            if args.is_some() {
                state.last_fired = Some(Instant::now());
                state.generation += 1;
            }
            args
        };

        if let Some(args) = args {
            (self.inner.operation)(args);
        }
    }

    /// Drop the trailing invocation and forget the last fire time
    ///
    /// The next call after a cancel runs immediately.
    pub fn cancel(&self) {
        self.inner.unschedule();
    }

    /// Whether a trailing invocation is scheduled
    pub fn is_pending(&self) -> bool {
        self.inner.is_scheduled()
    }

    /// Minimum spacing between invocations
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }
}

impl<A> Inner<A> {
    fn fire(weak: &Weak<Self>, generation: u64) {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        let args = {
            let mut state = inner.state.lock();
            if state.generation != generation {
                return;
            }
            if let Some(timer) = state.timer.take() {
                timer.detach();
            }
            let args = state.pending.take();
            if args.is_some() {
                state.last_fired = Some(Instant::now());
                state.generation += 1;
            }
            args
        };

        if let Some(args) = args {
            trace!("Throttle trailing call fired");
            (inner.operation)(args);
        }
    }
}

impl<A: Send + 'static> Unschedule for Inner<A> {
    fn unschedule(&self) {
        let mut state = self.state.lock();
        state.timer = None;
        state.pending = None;
        state.last_fired = None;
        state.generation += 1;
    }

    fn is_scheduled(&self) -> bool {
        self.state.lock().timer.is_some()
    }
}

impl<A: Send + 'static> Downgrade for Throttled<A> {
    fn downgrade(&self) -> Weak<dyn Unschedule> {
        let weak: Weak<Inner<A>> = Arc::downgrade(&self.inner);
        weak
    }
}

impl<A: Send + 'static> Unschedule for Throttled<A> {
    fn unschedule(&self) {
        self.cancel();
    }

    fn is_scheduled(&self) -> bool {
        self.is_pending()
    }
}
