//! Debounce with optional leading fire and a forced-fire ceiling
//!
//! Plain debouncing starves under continuous input: a user who never
//! pauses never gets a result. `max_wait` bounds that: while a burst keeps
//! going, the most recent arguments are forced through every `max_wait`.
//!
//! With `immediate`, the first call of a burst runs synchronously. That
//! leading fire consumes its arguments, so a one-call burst runs exactly
//! once; the trailing fire only happens if more calls arrived after the
//! leading one.

use crate::timer::Timer;
use crate::{Downgrade, Operation, Unschedule};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::trace;

/// Options for [`debounce_with_max_wait`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxWaitOptions {
    /// Fire the first call of a burst immediately
    pub immediate: bool,
    /// Force a fire at least this often under continuous calls
    pub max_wait: Option<Duration>,
}

/// Debounce `operation` by `delay` with leading/max-wait extensions
pub fn debounce_with_max_wait<A, F>(
    operation: F,
    delay: Duration,
    options: MaxWaitOptions,
) -> MaxWaitDebounced<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    MaxWaitDebounced {
        inner: Arc::new(Inner {
            operation: Box::new(operation),
            delay,
            options,
            state: Mutex::new(State {
                pending: None,
                timer: None,
                generation: 0,
                max_timer: None,
                max_epoch: 0,
            }),
        }),
    }
}

/// Trigger returned by [`debounce_with_max_wait`]
pub struct MaxWaitDebounced<A> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    operation: Operation<A>,
    delay: Duration,
    options: MaxWaitOptions,
    state: Mutex<State<A>>,
}

struct State<A> {
    pending: Option<A>,
    /// Quiet-period timer; present for the whole burst
    timer: Option<Timer>,
    generation: u64,
    /// Forced-fire timer; coexists with `timer`
    max_timer: Option<Timer>,
    max_epoch: u64,
}

impl<A> State<A> {
    fn clear(&mut self) {
        self.pending = None;
        self.timer = None;
        self.max_timer = None;
        self.generation += 1;
        self.max_epoch += 1;
    }
}

impl<A> Clone for MaxWaitDebounced<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> MaxWaitDebounced<A> {
    pub fn call(&self, args: A) {
        let mut state = self.inner.state.lock();
        let burst_start = state.timer.is_none();

        let leading = if self.inner.options.immediate && burst_start {
            state.pending = None;
            Some(args)
        } else {
            state.pending = Some(args);
            None
        };

        Inner::arm_quiet_timer(&self.inner, &mut state);

        if let Some(max_wait) = self.inner.options.max_wait {
            if state.max_timer.is_none() {
                Inner::arm_max_timer(&self.inner, &mut state, max_wait);
            }
        }
        drop(state);

        if let Some(args) = leading {
            trace!("Leading call fired");
            (self.inner.operation)(args);
        }
    }

    /// Invoke now with the pending arguments and end the burst
    pub fn flush(&self) {
        let args = {
            let mut state = self.inner.state.lock();
            let args = state.pending.take();
            state.clear();
            args
        };

        if let Some(args) = args {
            (self.inner.operation)(args);
        }
    }

    /// Drop pending arguments and cancel both timers
    pub fn cancel(&self) {
        self.inner.unschedule();
    }

    /// Whether a burst is in progress
    pub fn is_pending(&self) -> bool {
        self.inner.is_scheduled()
    }

    pub fn options(&self) -> MaxWaitOptions {
        self.inner.options
    }
}

impl<A: Send + 'static> Inner<A> {
    fn arm_quiet_timer(this: &Arc<Self>, state: &mut State<A>) {
        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(this);
        state.timer = Some(Timer::schedule(this.delay, move || {
            Inner::fire_quiet(&weak, generation)
        }));
    }

    fn arm_max_timer(this: &Arc<Self>, state: &mut State<A>, max_wait: Duration) {
        state.max_epoch += 1;
        let epoch = state.max_epoch;
        let weak = Arc::downgrade(this);
        state.max_timer = Some(Timer::schedule(max_wait, move || {
            Inner::fire_max(&weak, epoch)
        }));
    }

    /// Quiet period elapsed: the burst is over
    fn fire_quiet(weak: &Weak<Self>, generation: u64) {
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
            state.max_timer = None;
            state.max_epoch += 1;
            state.pending.take()
        };

        if let Some(args) = args {
            trace!("Trailing call fired");
            (inner.operation)(args);
        }
    }

    /// Burst outlived `max_wait`: force the latest arguments through
    fn fire_max(weak: &Weak<Self>, epoch: u64) {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        let args = {
            let mut state = inner.state.lock();
            if state.max_epoch != epoch {
                return;
            }
            if let Some(timer) = state.max_timer.take() {
                timer.detach();
            }

            let args = state.pending.take();
            if args.is_some() {
                // Restart the quiet period so the next call is not treated
                // as a fresh burst, and keep forcing while input continues.
                Inner::arm_quiet_timer(&inner, &mut state);
                if let Some(max_wait) = inner.options.max_wait {
                    Inner::arm_max_timer(&inner, &mut state, max_wait);
                }
            }
            args
        };

        if let Some(args) = args {
            trace!("Max wait reached, forced fire");
            (inner.operation)(args);
        }
    }
}

impl<A: Send + 'static> Unschedule for Inner<A> {
    fn unschedule(&self) {
        self.state.lock().clear();
    }

    fn is_scheduled(&self) -> bool {
        self.state.lock().timer.is_some()
    }
}

impl<A: Send + 'static> Downgrade for MaxWaitDebounced<A> {
    fn downgrade(&self) -> Weak<dyn Unschedule> {
        let weak: Weak<Inner<A>> = Arc::downgrade(&self.inner);
        weak
    }
}

impl<A: Send + 'static> Unschedule for MaxWaitDebounced<A> {
    fn unschedule(&self) {
        self.cancel();
    }

    fn is_scheduled(&self) -> bool {
        self.is_pending()
    }
}
