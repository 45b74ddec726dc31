//! Explicit lifecycle for one UI interaction
//!
//! A session owns every timer and deduplicator created through it.
//! `dispose()` unschedules all of them, so nothing fires against a consumer
//! that has gone away. Ownership is weak: a helper dropped mid-session is
//! released right away and pruned from the session. Operations scheduled through a session are also
//! gated on it: once disposed, a timer that slipped through does not invoke
//! its operation.

use cadence_core::{RequestDeduplicator, WeakDeduplicator};
use parking_lot::Mutex;
use scheduler::{Downgrade, MaxWaitDebounced, MaxWaitOptions, Unschedule};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Options for [`Session::dispose`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposeOptions {
    /// Also stop sharing every in-flight request of the session's
    /// deduplicators. The requests keep running; their results are ignored.
    pub purge_requests: bool,
}

impl DisposeOptions {
    /// Dispose and purge deduplicator registries
    pub fn purge() -> Self {
        Self {
            purge_requests: true,
        }
    }
}

/// Something holding in-flight requests that can be forgotten on dispose
trait PurgeRequests: Send + Sync {
    fn purge(&self) -> usize;
    fn is_dropped(&self) -> bool;
}

impl<T: Send + Sync + 'static> PurgeRequests for WeakDeduplicator<T> {
    fn purge(&self) -> usize {
        self.upgrade().map_or(0, |dedup| {
            let count = dedup.pending_count();
            dedup.cancel_all();
            count
        })
    }

    fn is_dropped(&self) -> bool {
        WeakDeduplicator::is_dropped(self)
    }
}

/// Scoped owner of timers and request registries
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    id: Ulid,
    disposed: AtomicBool,
    primitives: Mutex<Vec<Weak<dyn Unschedule>>>,
    registries: Mutex<Vec<Box<dyn PurgeRequests>>>,
}

impl Session {
    /// Start a new session
    pub fn create() -> Self {
        let id = Ulid::new();
        debug!(session = %id, "Session created");
        Self {
            inner: Arc::new(Inner {
                id,
                disposed: AtomicBool::new(false),
                primitives: Mutex::new(Vec::new()),
                registries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> Ulid {
        self.inner.id
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Debounce `operation`, owned by this session
    pub fn debounce<A, F>(&self, operation: F, delay: Duration) -> scheduler::Debounced<A>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let debounced = scheduler::debounce(self.gate(operation), delay);
        self.track(&debounced);
        debounced
    }

    /// Throttle `operation`, owned by this session
    pub fn throttle<A, F>(&self, operation: F, interval: Duration) -> scheduler::Throttled<A>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let throttled = scheduler::throttle(self.gate(operation), interval);
        self.track(&throttled);
        throttled
    }

    /// Debounce with max wait, owned by this session
    pub fn debounce_with_max_wait<A, F>(
        &self,
        operation: F,
        delay: Duration,
        options: MaxWaitOptions,
    ) -> MaxWaitDebounced<A>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let debounced = scheduler::debounce_with_max_wait(self.gate(operation), delay, options);
        self.track(&debounced);
        debounced
    }

    /// Create a deduplicator whose registry is purged on dispose (if asked)
    pub fn deduplicator<T>(&self) -> RequestDeduplicator<T>
    where
        T: Send + Sync + 'static,
    {
        let dedup = RequestDeduplicator::new();
        if self.is_disposed() {
            warn!(session = %self.inner.id, "Deduplicator created on a disposed session");
        } else {
            let mut registries = self.inner.registries.lock();
            registries.retain(|r| !r.is_dropped());
            registries.push(Box::new(dedup.downgrade()));
        }
        dedup
    }

    /// Hand an existing primitive to this session for teardown
    ///
    /// The session does not keep it alive.
    pub fn track<U: Downgrade>(&self, primitive: &U) {
        if self.is_disposed() {
            warn!(session = %self.inner.id, "Primitive registered on a disposed session");
            primitive.unschedule();
            return;
        }
        let mut primitives = self.inner.primitives.lock();
        primitives.retain(|p| p.strong_count() > 0);
        primitives.push(primitive.downgrade());
    }

    /// Number of primitives with an invocation currently scheduled
    pub fn scheduled_count(&self) -> usize {
        self.inner
            .primitives
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|p| p.is_scheduled())
            .count()
    }

    /// Live primitives and deduplicators owned by this session
    ///
    /// Prunes handles whose helpers have been dropped.
    pub fn owned_count(&self) -> usize {
        let mut primitives = self.inner.primitives.lock();
        primitives.retain(|p| p.strong_count() > 0);
        let mut registries = self.inner.registries.lock();
        registries.retain(|r| !r.is_dropped());
        primitives.len() + registries.len()
    }

    /// End the session
    ///
    /// Unschedules every owned primitive and releases them. Work that has
    /// already started is not interrupted; helpers bound to this session
    /// drop its results. Calling `dispose` twice is a no-op.
    pub fn dispose(&self, options: DisposeOptions) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let primitives: Vec<_> = std::mem::take(&mut *self.inner.primitives.lock())
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for primitive in &primitives {
            primitive.unschedule();
        }

        let registries = std::mem::take(&mut *self.inner.registries.lock());
        let purged: usize = if options.purge_requests {
            registries.iter().map(|r| r.purge()).sum()
        } else {
            0
        };

        info!(
            session = %self.inner.id,
            primitives = primitives.len(),
            purged_requests = purged,
            "Session disposed"
        );
    }

    /// Wrap `operation` so it becomes a no-op once the session is disposed
    fn gate<A, F>(&self, operation: F) -> impl Fn(A) + Send + Sync + 'static
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        // Weak: primitives owned by the session must not keep it alive
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        move |args| {
            let live = weak
                .upgrade()
                .map_or(false, |inner| !inner.disposed.load(Ordering::Acquire));
            if live {
                operation(args);
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(u32) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        (count, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_unschedules_owned_timers() {
        let session = Session::create();
        let (debounced_hits, op_a) = counter();
        let (throttled_hits, op_b) = counter();

        let debounced = session.debounce(op_a, Duration::from_millis(100));
        let throttled = session.throttle(op_b, Duration::from_millis(100));

        debounced.call(1);
        throttled.call(1);
        throttled.call(2);
        assert_eq!(session.scheduled_count(), 2);

        session.dispose(DisposeOptions::default());
        assert!(session.is_disposed());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(debounced_hits.load(Ordering::SeqCst), 0);
        // Only the leading throttle call ran, before dispose
        assert_eq!(throttled_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_dispose_are_ignored() {
        let session = Session::create();
        let (hits, op) = counter();
        let debounced = session.debounce(op, Duration::from_millis(10));

        session.dispose(DisposeOptions::default());
        debounced.call(1);
        debounced.flush();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_with_purge_stops_sharing() {
        let session = Session::create();
        let dedup = session.deduplicator::<u32>();

        let original = dedup.execute("k", || async {
            sleep(Duration::from_millis(50)).await;
            1
        });
        assert_eq!(dedup.pending_count(), 1);

        session.dispose(DisposeOptions::purge());
        assert_eq!(dedup.pending_count(), 0);

        // Stop sharing, not stop executing
        assert_eq!(original.await, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_without_purge_keeps_registry() {
        let session = Session::create();
        let dedup = session.deduplicator::<u32>();
        let _pending = dedup.execute("k", || async {
            sleep(Duration::from_millis(50)).await;
            1
        });

        session.dispose(DisposeOptions::default());
        assert_eq!(dedup.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_is_idempotent_and_track_after_dispose_unschedules() {
        let session = Session::create();
        session.dispose(DisposeOptions::default());
        session.dispose(DisposeOptions::purge());

        let (hits, op) = counter();
        let debounced = scheduler::debounce(op, Duration::from_millis(10));
        debounced.call(1);
        session.track(&debounced);
        assert!(!debounced.is_pending());

        sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_helpers_are_released() {
        let session = Session::create();
        let (hits, op) = counter();

        let kept = session.debounce(|_: u32| {}, Duration::from_millis(100));
        let dropped = session.debounce(op, Duration::from_millis(100));
        let dedup = session.deduplicator::<u32>();
        assert_eq!(session.owned_count(), 3);

        dropped.call(1);
        kept.call(1);
        assert_eq!(session.scheduled_count(), 2);

        drop(dropped);
        drop(dedup);
        assert_eq!(session.owned_count(), 1);
        assert_eq!(session.scheduled_count(), 1);

        // Dropping the last handle cancels the pending invocation
        sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Later registrations keep working alongside the survivor
        let _throttled = session.throttle(|_: u32| {}, Duration::from_millis(50));
        assert_eq!(session.owned_count(), 2);
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let a = Session::create();
        let b = Session::create();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }
}
