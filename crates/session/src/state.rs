//! Observable interaction state

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::watch;

/// Snapshot of a value-driven interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionState<V> {
    /// Current value, updated synchronously on every change
    pub value: V,
    /// An async callback is running
    pub busy: bool,
    /// The value differs from the initial one
    pub dirty: bool,
    /// Error from the most recent callback
    pub error: Option<String>,
}

impl<V> InteractionState<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            busy: false,
            dirty: false,
            error: None,
        }
    }
}

/// Watch-backed state cell shared by a helper and its observers
pub(crate) struct StateCell<S> {
    tx: watch::Sender<S>,
}

impl<S: Clone> StateCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Mutate in place and notify observers
    pub(crate) fn update(&self, f: impl FnOnce(&mut S)) {
        self.tx.send_modify(f);
    }

    pub(crate) fn replace(&self, state: S) {
        self.tx.send_replace(state);
    }

    pub(crate) fn snapshot(&self) -> S {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

/// Bookkeeping for overlapping async callbacks
///
/// Tracks how many callbacks are running (for the busy flag) and which
/// dispatch is the latest, so a slow stale response cannot overwrite a
/// newer one.
#[derive(Debug, Default)]
pub(crate) struct Dispatches {
    in_flight: AtomicUsize,
    latest: AtomicU64,
}

impl Dispatches {
    /// Register a new dispatch; returns its sequence number
    pub(crate) fn begin(&self) -> u64 {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.latest.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Mark a dispatch finished; returns whether it is still the latest
    pub(crate) fn finish(&self, seq: u64) -> bool {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.latest.load(Ordering::Acquire) == seq
    }

    /// Make every running dispatch stale
    pub(crate) fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }
}
