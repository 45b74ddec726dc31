//! Request deduplication for concurrent identical operations
//!
//! When several callers ask for the same key while an operation is in
//! flight, only the first caller's factory runs. Everyone else receives a
//! clone of the same shared future, so all of them observe the same value
//! or the same error.
//!
//! Each key moves through `absent -> pending -> absent`. The entry is
//! removed when the operation settles, whether or not anyone is still
//! awaiting it.
//!
//! # Cancellation
//!
//! [`RequestDeduplicator::cancel`] and [`RequestDeduplicator::cancel_all`]
//! only stop *sharing*. The underlying operation keeps running and its
//! existing waiters still get its result; the next caller for that key just
//! starts a fresh operation. To actually stop the work, use
//! [`RequestDeduplicator::abort`].

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, trace, warn};

/// Failures added by the deduplicator itself
///
/// Errors produced by the operation are part of `T` (typically
/// `Result<V, E>`) and pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DedupError {
    #[error("operation panicked: {0}")]
    Panicked(String),

    #[error("operation was aborted")]
    Aborted,
}

impl From<JoinError> for DedupError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            DedupError::Panicked(panic_message(err.into_panic()))
        } else {
            DedupError::Aborted
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle to a deduplicated operation
///
/// Cloneable; every clone resolves to the same output.
pub type SharedOperation<T> = Shared<BoxFuture<'static, Result<T, DedupError>>>;

/// Registry entry for one in-flight operation
struct PendingOperation<T> {
    /// Distinguishes this operation from later ones under the same key
    id: u64,
    shared: SharedOperation<T>,
    abort: AbortHandle,
}

struct Registry<T> {
    pending: DashMap<String, PendingOperation<T>, RandomState>,
    next_id: AtomicU64,
}

impl<T> Registry<T> {
    /// Remove `key` only if it still refers to operation `id`
    fn settle(&self, key: &str, id: u64) {
        if self.pending.remove_if(key, |_, op| op.id == id).is_some() {
            trace!(key, id, "Pending operation settled");
        }
    }
}

/// Removes the registry entry when the operation's task ends
///
/// Runs on normal completion, on panic and on abort.
struct SettleGuard<T> {
    registry: Weak<Registry<T>>,
    key: String,
    id: u64,
}

impl<T> Drop for SettleGuard<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.settle(&self.key, self.id);
        }
    }
}

/// Registry of in-flight operations keyed by an opaque string
///
/// Cloning yields another handle to the same registry. Instances are never
/// global: two deduplicators never share keys.
pub struct RequestDeduplicator<T> {
    inner: Arc<Registry<T>>,
}

impl<T> Clone for RequestDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestDeduplicator<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry {
                pending: DashMap::with_hasher(RandomState::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Stop sharing the operation under `key`
    ///
    /// The operation keeps running. Callers already holding its future still
    /// receive its result; the next `execute` for `key` starts a new one.
    /// Returns whether an entry was removed.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = self.inner.pending.remove(key).is_some();
        if removed {
            debug!(key, "Stopped sharing pending operation");
        }
        removed
    }

    /// Stop sharing every pending operation
    pub fn cancel_all(&self) {
        let count = self.inner.pending.len();
        self.inner.pending.clear();
        debug!(count, "Stopped sharing all pending operations");
    }

    /// Stop sharing *and* abort the operation under `key`
    ///
    /// Every waiter on the aborted operation resolves to
    /// [`DedupError::Aborted`]. Returns whether an entry was found.
    pub fn abort(&self, key: &str) -> bool {
        match self.inner.pending.remove(key) {
            Some((_, op)) => {
                op.abort.abort();
                warn!(key, "Aborted pending operation");
                true
            }
            None => false,
        }
    }

    /// Number of keys with an operation in flight
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether `key` has an operation in flight
    pub fn contains(&self, key: &str) -> bool {
        self.inner.pending.contains_key(key)
    }

    /// Handle that does not keep the registry alive
    pub fn downgrade(&self) -> WeakDeduplicator<T> {
        WeakDeduplicator {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle from [`RequestDeduplicator::downgrade`]
pub struct WeakDeduplicator<T> {
    inner: Weak<Registry<T>>,
}

impl<T> Clone for WeakDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakDeduplicator<T> {
    /// The registry, if any strong handle is still alive
    pub fn upgrade(&self) -> Option<RequestDeduplicator<T>> {
        self.inner.upgrade().map(|inner| RequestDeduplicator { inner })
    }

    /// Whether the registry has been dropped
    pub fn is_dropped(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Run `factory` for `key`, or join the operation already in flight
    ///
    /// `factory` is invoked only when no operation is pending for `key`.
    /// Its future is spawned onto the Tokio runtime right away, so it makes
    /// progress (and the entry is cleaned up on settlement) even if nobody
    /// awaits the returned handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn execute<F, Fut>(&self, key: impl Into<String>, factory: F) -> SharedOperation<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = key.into();
        if let Some(existing) = self.join(&key) {
            return existing;
        }

        // The factory runs outside the map lock so it may re-enter this
        // deduplicator with a different key.
        self.register(key, factory())
    }

    /// Like [`execute`](Self::execute), but `factory` may decline to start
    /// an operation
    ///
    /// A pending operation for `key` is joined without consulting `factory`.
    /// Otherwise `factory` decides; `None` registers nothing and is returned
    /// as is.
    pub fn try_execute<F, Fut>(&self, key: impl Into<String>, factory: F) -> Option<SharedOperation<T>>
    where
        F: FnOnce() -> Option<Fut>,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = key.into();
        if let Some(existing) = self.join(&key) {
            return Some(existing);
        }

        factory().map(|operation| self.register(key, operation))
    }

    fn join(&self, key: &str) -> Option<SharedOperation<T>> {
        let existing = self.inner.pending.get(key)?;
        trace!(key, "Joining pending operation");
        Some(existing.shared.clone())
    }

    fn register<Fut>(&self, key: String, operation: Fut) -> SharedOperation<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        match self.inner.pending.entry(key) {
            Entry::Occupied(entry) => {
                // Another thread registered the key while the factory ran.
                // Our future was never polled; drop it.
                trace!(key = %entry.key(), "Lost registration race, joining");
                entry.get().shared.clone()
            }
            Entry::Vacant(entry) => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let guard = SettleGuard {
                    registry: Arc::downgrade(&self.inner),
                    key: entry.key().clone(),
                    id,
                };

                let handle = tokio::spawn(async move {
                    let output = operation.await;
                    drop(guard);
                    output
                });
                let abort = handle.abort_handle();

                let shared = async move { handle.await.map_err(DedupError::from) }
                    .boxed()
                    .shared();

                debug!(key = %entry.key(), id, "Started pending operation");
                entry.insert(PendingOperation {
                    id,
                    shared: shared.clone(),
                    abort,
                });
                shared
            }
        }
    }
}
