//! Trailing-edge debouncing
//!
//! Collapses a burst of calls into one invocation that fires once the
//! caller has been quiet for the configured delay. Only the arguments of
//! the last call in the burst are delivered.

use crate::timer::Timer;
use crate::{Downgrade, Operation, Unschedule};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::trace;

/// Debounce `operation` by `delay`
///
/// ```ignore
/// let save = debounce(|draft: String| store(draft), Duration::from_millis(300));
/// save.call("h".into());
/// save.call("hi".into()); // only "hi" is stored, 300ms from now
/// ```
pub fn debounce<A, F>(operation: F, delay: Duration) -> Debounced<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Debounced {
        inner: Arc::new(Inner {
            operation: Box::new(operation),
            delay,
            state: Mutex::new(State {
                pending: None,
                timer: None,
                generation: 0,
            }),
        }),
    }
}

/// Debounced trigger for an operation taking `A`
///
/// Clones share the same timer and pending arguments. When the last clone
/// is dropped, a scheduled invocation is cancelled.
pub struct Debounced<A> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    operation: Operation<A>,
    delay: Duration,
    state: Mutex<State<A>>,
}

struct State<A> {
    /// Arguments of the most recent call
    pending: Option<A>,
    /// At most one scheduled invocation
    timer: Option<Timer>,
    /// Bumped on every call; a timer only fires for its own generation
    generation: u64,
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Debounced<A> {
    /// Record `args` and restart the quiet period
    pub fn call(&self, args: A) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        let generation = state.generation;
        state.pending = Some(args);

        let weak = Arc::downgrade(&self.inner);
        // Replacing the slot drops, and so cancels, the previous timer
        state.timer = Some(Timer::schedule(self.inner.delay, move || {
            Inner::fire(&weak, generation)
        }));

        trace!(generation, delay = ?self.inner.delay, "Debounce window restarted");
    }

    /// Invoke now with the pending arguments, if any
    pub fn flush(&self) {
        let args = {
            let mut state = self.inner.state.lock();
            state.timer = None;
            state.pending.take()
        };

        if let Some(args) = args {
            trace!("Debounce flushed");
            (self.inner.operation)(args);
        }
    }

    /// Drop the pending arguments and cancel the timer
    pub fn cancel(&self) {
        self.inner.unschedule();
    }

    /// Whether an invocation is scheduled
    pub fn is_pending(&self) -> bool {
        self.inner.is_scheduled()
    }

    /// Quiet period before the trailing invocation
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl<A> Inner<A> {
    fn fire(weak: &Weak<Self>, generation: u64) {
        // Every handle dropped: nothing left to notify
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
            state.pending.take()
        };

        // Lock released: the operation may call back into this debouncer
        if let Some(args) = args {
            trace!(generation, "Debounce fired");
            (inner.operation)(args);
        }
    }
}

impl<A: Send + 'static> Unschedule for Inner<A> {
    fn unschedule(&self) {
        let mut state = self.state.lock();
        state.timer = None;
        state.pending = None;
    }

    fn is_scheduled(&self) -> bool {
        self.state.lock().timer.is_some()
    }
}

impl<A: Send + 'static> Downgrade for Debounced<A> {
    fn downgrade(&self) -> Weak<dyn Unschedule> {
        let weak: Weak<Inner<A>> = Arc::downgrade(&self.inner);
        weak
    }
}

impl<A: Send + 'static> Unschedule for Debounced<A> {
    fn unschedule(&self) {
        self.cancel();
    }

    fn is_scheduled(&self) -> bool {
        self.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Instant};

    type Calls<A> = Arc<Mutex<Vec<(A, Instant)>>>;

    fn recorder<A: Send + 'static>() -> (Calls<A>, impl Fn(A) + Send + Sync + 'static) {
        let calls: Calls<A> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |args| sink.lock().push((args, Instant::now())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_call() {
        let (calls, op) = recorder::<&'static str>();
        let search = debounce(op, Duration::from_millis(300));

        for query in ["r", "ru", "rus", "rust"] {
            search.call(query);
            sleep(Duration::from_millis(100)).await;
        }
        let last_call = Instant::now() - Duration::from_millis(100);

        sleep(Duration::from_millis(500)).await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "rust");
        assert_eq!(calls[0].1 - last_call, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_calls_never_fires() {
        let (calls, op) = recorder::<u32>();
        let _debounced = debounce(op, Duration::from_millis(10));

        sleep(Duration::from_secs(1)).await;
        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_call_resets_window() {
        let (calls, op) = recorder::<u32>();
        let debounced = debounce(op, Duration::from_millis(100));

        // 50 calls, 90ms apart: never quiet for 100ms until the end
        for i in 0..50 {
            debounced.call(i);
            sleep(Duration::from_millis(90)).await;
            assert!(calls.lock().is_empty());
        }

        sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(calls.lock()[0].0, 49);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (calls, op) = recorder::<u32>();
        let debounced = debounce(op, Duration::from_millis(50));

        debounced.call(1);
        debounced.call(2);
        sleep(Duration::from_millis(100)).await;
        debounced.call(3);
        sleep(Duration::from_millis(100)).await;

        let values: Vec<u32> = calls.lock().iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_call() {
        let (calls, op) = recorder::<u32>();
        let debounced = debounce(op, Duration::from_millis(50));

        debounced.call(1);
        assert!(debounced.is_pending());
        debounced.cancel();
        assert!(!debounced.is_pending());

        sleep(Duration::from_millis(100)).await;
        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_fires_immediately_once() {
        let (calls, op) = recorder::<u32>();
        let debounced = debounce(op, Duration::from_millis(50));

        debounced.call(7);
        debounced.flush();
        assert_eq!(calls.lock().len(), 1);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.lock().len(), 1);

        // Nothing pending: flush is a no-op
        debounced.flush();
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_cancels() {
        let (calls, op) = recorder::<u32>();
        let debounced = debounce(op, Duration::from_millis(50));
        let clone = debounced.clone();

        debounced.call(1);
        drop(debounced);
        assert!(clone.is_pending());
        drop(clone);

        sleep(Duration::from_millis(100)).await;
        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_may_retrigger() {
        let fired = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Debounced<u32>>>> = Arc::new(Mutex::new(None));

        let counter = Arc::clone(&fired);
        let weak_slot = Arc::downgrade(&slot);
        let debounced = debounce(
            move |n: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                if n > 0 {
                    if let Some(slot) = weak_slot.upgrade() {
                        if let Some(d) = slot.lock().as_ref() {
                            d.call(n - 1);
                        }
                    }
                }
            },
            Duration::from_millis(10),
        );
        *slot.lock() = Some(debounced.clone());

        debounced.call(3);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 4);

        slot.lock().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tuple_arguments() {
        let (calls, op) = recorder::<(String, usize)>();
        let debounced = debounce(op, Duration::from_millis(20));

        debounced.call(("title".to_string(), 1));
        debounced.call(("title".to_string(), 2));
        sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.lock()[0].0, ("title".to_string(), 2));
    }
}
