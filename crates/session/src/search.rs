//! Search-as-you-type
//!
//! Keystrokes update the query immediately. Once typing pauses, the query
//! goes through admission control and request deduplication before it
//! reaches the backend:
//!
//! ```text
//! set_query -> debounce -> rate limiter -> deduplicator -> fetch
//! ```
//!
//! A query that is denied admission is not lost: it is re-dispatched once
//! the limiter's window allows it, unless a newer query replaced it.
//! Joining a request already in flight never counts against the limit,
//! since it makes no network call.

use crate::session::Session;
use crate::state::{Dispatches, StateCell};
use cadence_core::{OrchestrationConfig, RateLimiter, RequestDeduplicator};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use scheduler::{Debounced, Timer};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

type Fetch<R> = Box<dyn Fn(String) -> BoxFuture<'static, Result<R, String>> + Send + Sync>;

/// Tuning for a [`SearchQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Pause after the last keystroke before searching
    pub delay: Duration,
    /// Backend calls allowed per window
    pub max_requests: usize,
    /// Rate limit window
    pub window: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&OrchestrationConfig::default())
    }
}

impl SearchOptions {
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self {
            delay: config.debounce.delay(),
            max_requests: config.rate_limit.max_requests,
            window: config.rate_limit.window(),
        }
    }
}

/// Observable search state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState<R> {
    /// Text as typed, updated on every keystroke
    pub query: String,
    /// Results of the latest completed search
    pub results: Option<R>,
    /// A backend call is in flight
    pub busy: bool,
    /// Error of the latest completed search
    pub error: Option<String>,
    /// Set while a denied query waits for admission
    pub backoff: Option<Duration>,
}

impl<R> Default for SearchState<R> {
    fn default() -> Self {
        Self {
            query: String::new(),
            results: None,
            busy: false,
            error: None,
            backoff: None,
        }
    }
}

/// Counters describing how the orchestration shaped the traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Debounced queries that reached the orchestration pipeline
    pub dispatched: u64,
    /// Backend calls actually started
    pub fetched: u64,
    /// Queries that joined a request already in flight
    pub joined: u64,
    /// Admission denials (each followed by a scheduled re-dispatch)
    pub denied: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    fetched: AtomicU64,
    joined: AtomicU64,
    denied: AtomicU64,
}

/// Search box bound to a backend `fetch`
pub struct SearchQuery<R> {
    shared: Arc<Shared<R>>,
    trigger: Debounced<String>,
}

struct Shared<R> {
    session: Session,
    state: StateCell<SearchState<R>>,
    limiter: RateLimiter,
    dedup: RequestDeduplicator<Result<R, String>>,
    fetch: Fetch<R>,
    dispatches: Dispatches,
    /// Re-dispatch of a denied query
    retry: Mutex<Option<Timer>>,
    counters: Counters,
}

impl<R> SearchQuery<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Bind a search box to `fetch`
    ///
    /// `max_requests` below 1 would defer every query forever; it is raised
    /// to 1, the same floor config validation enforces.
    pub fn new<F, Fut, E>(session: &Session, options: SearchOptions, fetch: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        E: Display + 'static,
    {
        let fetch: Fetch<R> = Box::new(move |query| {
            fetch(query)
                .map(|result| result.map_err(|e| e.to_string()))
                .boxed()
        });

        if options.max_requests == 0 {
            warn!(session = %session.id(), "Search max_requests of 0 admits nothing, using 1");
        }
        let max_requests = options.max_requests.max(1);

        let shared = Arc::new(Shared {
            session: session.clone(),
            state: StateCell::new(SearchState::default()),
            limiter: RateLimiter::new(max_requests, options.window),
            dedup: session.deduplicator(),
            fetch,
            dispatches: Dispatches::default(),
            retry: Mutex::new(None),
            counters: Counters::default(),
        });

        let weak = Arc::downgrade(&shared);
        let trigger = session.debounce(
            move |query: String| {
                if let Some(shared) = weak.upgrade() {
                    Shared::dispatch(&shared, query);
                }
            },
            options.delay,
        );

        Self { shared, trigger }
    }

    /// Record a keystroke
    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.shared.state.update(|s| s.query = query.clone());
        self.trigger.call(query);
    }

    /// Search now (e.g. on Enter) instead of waiting for the pause
    pub fn submit(&self) {
        self.trigger.flush();
    }

    /// Clear query, results and errors
    ///
    /// Cancels the pending search and any scheduled re-dispatch; results of
    /// searches already in flight are ignored.
    pub fn reset(&self) {
        self.trigger.cancel();
        self.shared.retry.lock().take();
        self.shared.dispatches.invalidate();
        let busy = self.shared.dispatches.busy();
        self.shared.state.replace(SearchState {
            busy,
            ..SearchState::default()
        });
    }

    pub fn query(&self) -> String {
        self.shared.state.snapshot().query
    }

    pub fn snapshot(&self) -> SearchState<R> {
        self.shared.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState<R>> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> SearchStats {
        let c = &self.shared.counters;
        SearchStats {
            dispatched: c.dispatched.load(Ordering::Relaxed),
            fetched: c.fetched.load(Ordering::Relaxed),
            joined: c.joined.load(Ordering::Relaxed),
            denied: c.denied.load(Ordering::Relaxed),
        }
    }

    /// Backend calls currently shared through the deduplicator
    pub fn in_flight(&self) -> usize {
        self.shared.dedup.pending_count()
    }
}

impl<R> Shared<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn dispatch(this: &Arc<Self>, query: String) {
        if this.session.is_disposed() {
            return;
        }

        // A newer dispatch supersedes any scheduled re-dispatch
        this.retry.lock().take();

        let query = query.trim().to_string();
        if query.is_empty() {
            this.dispatches.invalidate();
            this.state.update(|s| {
                s.results = None;
                s.error = None;
                s.backoff = None;
            });
            return;
        }

        this.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        // Admission is only consulted when a backend call would start
        let mut started = false;
        let operation = this.dedup.try_execute(query.clone(), || {
            if !this.limiter.record_request() {
                return None;
            }
            started = true;
            this.counters.fetched.fetch_add(1, Ordering::Relaxed);
            debug!(query = %query, "Search request started");
            Some((this.fetch)(query.clone()))
        });

        let Some(operation) = operation else {
            Self::defer(this, query);
            return;
        };

        if !started {
            this.counters.joined.fetch_add(1, Ordering::Relaxed);
            trace!(query = %query, "Joining search already in flight");
        }

        let seq = this.dispatches.begin();
        this.state.update(|s| {
            s.busy = true;
            s.backoff = None;
        });

        let shared = Arc::clone(this);
        tokio::spawn(async move {
            let outcome = match operation.await {
                Ok(result) => result,
                Err(e) => Err(e.to_string()),
            };
            let latest = shared.dispatches.finish(seq);
            let busy = shared.dispatches.busy();

            if shared.session.is_disposed() {
                return;
            }

            shared.state.update(|s| {
                s.busy = busy;
                if latest {
                    match outcome {
                        Ok(results) => {
                            s.results = Some(results);
                            s.error = None;
                        }
                        Err(e) => s.error = Some(e),
                    }
                }
            });
        });
    }

    /// Admission denied: retry the same query once the window allows it
    fn defer(this: &Arc<Self>, query: String) {
        let wait = this.limiter.time_until_next_request();
        this.counters.denied.fetch_add(1, Ordering::Relaxed);
        warn!(query = %query, wait = ?wait, "Search rate limited, deferring");

        this.state.update(|s| s.backoff = Some(wait));

        let weak = Arc::downgrade(this);
        let timer = Timer::schedule(wait, move || {
            if let Some(shared) = weak.upgrade() {
                if let Some(own) = shared.retry.lock().take() {
                    own.detach();
                }
                Shared::dispatch(&shared, query);
            }
        });
        *this.retry.lock() = Some(timer);
    }
}
