//! Value with a debounced async callback
//!
//! The "filter changed" pattern: the value is updated synchronously on
//! every change so the UI stays responsive, while the expensive callback
//! (refetch, recompute) runs once the user pauses.

use crate::session::Session;
use crate::state::{Dispatches, InteractionState, StateCell};
use futures::future::BoxFuture;
use futures::FutureExt;
use scheduler::Debounced;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

type Callback<V> = Box<dyn Fn(V) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Observable value whose changes drive a debounced async callback
pub struct DebouncedValue<V> {
    shared: Arc<Shared<V>>,
    trigger: Debounced<V>,
}

struct Shared<V> {
    session: Session,
    initial: V,
    state: StateCell<InteractionState<V>>,
    dispatches: Dispatches,
    callback: Callback<V>,
}

impl<V> DebouncedValue<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Bind a value to `callback`, debounced by `delay`, owned by `session`
    pub fn new<F, Fut, E>(session: &Session, initial: V, delay: Duration, callback: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        let callback: Callback<V> = Box::new(move |value| {
            callback(value)
                .map(|result| result.map_err(|e| e.to_string()))
                .boxed()
        });

        let shared = Arc::new(Shared {
            session: session.clone(),
            state: StateCell::new(InteractionState::new(initial.clone())),
            initial,
            dispatches: Dispatches::default(),
            callback,
        });

        let weak = Arc::downgrade(&shared);
        let trigger = session.debounce(
            move |value: V| {
                if let Some(shared) = weak.upgrade() {
                    Shared::dispatch(&shared, value);
                }
            },
            delay,
        );

        Self { shared, trigger }
    }

    /// Update the value now and schedule the callback
    pub fn set(&self, value: V) {
        let dirty = value != self.shared.initial;
        self.shared.state.update(|s| {
            s.value = value.clone();
            s.dirty = dirty;
        });
        self.trigger.call(value);
    }

    /// Run the pending callback now instead of waiting for the pause
    pub fn flush(&self) {
        self.trigger.flush();
    }

    /// Restore the initial value and clear error/dirty state
    ///
    /// Cancels the pending callback and ignores results of callbacks
    /// already running.
    pub fn reset(&self) {
        self.trigger.cancel();
        self.shared.dispatches.invalidate();
        let busy = self.shared.dispatches.busy();
        self.shared.state.replace(InteractionState {
            busy,
            ..InteractionState::new(self.shared.initial.clone())
        });
    }

    pub fn value(&self) -> V {
        self.shared.state.snapshot().value
    }

    pub fn snapshot(&self) -> InteractionState<V> {
        self.shared.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<InteractionState<V>> {
        self.shared.state.subscribe()
    }
}

impl<V> Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn dispatch(this: &Arc<Self>, value: V) {
        let seq = this.dispatches.begin();
        this.state.update(|s| s.busy = true);

        let future = (this.callback)(value);
        let shared = Arc::clone(this);
        tokio::spawn(async move {
            let result = future.await;
            let latest = shared.dispatches.finish(seq);
            let busy = shared.dispatches.busy();

            if shared.session.is_disposed() {
                debug!(session = %shared.session.id(), "Dropping callback result after dispose");
                return;
            }

            shared.state.update(|s| {
                s.busy = busy;
                if latest {
                    s.error = result.err();
                }
            });
        });
    }
}
