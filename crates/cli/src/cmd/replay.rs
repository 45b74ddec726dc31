//! Replay a keystroke script through search-as-you-type
//!
//! The script drives a `SearchQuery` (debounce, rate limit, dedup) against a
//! simulated backend whose latency comes from `[api]`. The replay runs on a
//! paused clock: the timeline is exact and the command returns immediately.

use super::script::{self, elapsed_ms, ScriptEvent};
use crate::system_config;
use anyhow::Result;
use cadence_core::OrchestrationConfig;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use serde::Serialize;
use session::{DisposeOptions, SearchOptions, SearchQuery, Session};
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Settling rounds before the replay is considered stuck
const MAX_SETTLE_ROUNDS: usize = 64;

/// What the simulated backend searches
const CATALOG: &[&str] = &[
    "clap",
    "futures",
    "parking_lot",
    "rust-analyzer",
    "rustc",
    "rustls",
    "serde",
    "serde_json",
    "tokio",
    "tokio-util",
    "tracing",
    "ulid",
];

#[derive(Debug, Clone, Serialize)]
pub struct FetchRecord {
    pub query: String,
    pub started_ms: u64,
    pub finished_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub keystrokes: usize,
    pub elapsed_ms: u64,
    /// Debounced queries that reached admission control
    pub dispatched: u64,
    /// Backend calls actually made
    pub fetched: u64,
    /// Queries served by a call already in flight
    pub joined: u64,
    /// Admission denials, each followed by a deferred retry
    pub denied: u64,
    pub final_query: String,
    pub final_results: Vec<String>,
    pub fetches: Vec<FetchRecord>,
}

pub async fn run(path: &Path, json: bool) -> Result<()> {
    let config = system_config::load()?;
    let events = script::load(path)?;

    let report = replay(&config, &events).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {} keystrokes over {}ms (debounce {}ms, {} calls per {}ms, latency {}ms)\n",
        "Replay:".bold(),
        report.keystrokes,
        report.elapsed_ms,
        config.debounce.delay_ms,
        config.rate_limit.max_requests,
        config.rate_limit.window_ms,
        config.api.latency_ms
    );

    println!("{}", "Backend calls".bold());
    if report.fetches.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for fetch in &report.fetches {
        let finished = fetch
            .finished_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>7}ms -> {:>7}  {}",
            fetch.started_ms,
            finished,
            format!("{:?}", fetch.query).cyan()
        );
    }

    println!();
    println!("Dispatched:  {}", report.dispatched);
    println!("Fetched:     {}", report.fetched.to_string().green());
    println!("Joined:      {}", report.joined);
    println!("Denied:      {}", report.denied.to_string().yellow());
    println!("Final query: {:?}", report.final_query);
    println!("Results:     {}", report.final_results.join(", "));

    Ok(())
}

pub async fn replay(config: &OrchestrationConfig, events: &[ScriptEvent]) -> Result<ReplayReport> {
    let session = Session::create();
    let start = Instant::now();
    let fetches: Arc<Mutex<Vec<FetchRecord>>> = Arc::default();

    let latency = config.api.latency();
    let log = Arc::clone(&fetches);
    let search = SearchQuery::new(
        &session,
        SearchOptions::from_config(config),
        move |query: String| {
            let log = Arc::clone(&log);
            let index = {
                let mut log = log.lock();
                log.push(FetchRecord {
                    query: query.clone(),
                    started_ms: elapsed_ms(start),
                    finished_ms: None,
                });
                log.len() - 1
            };
            async move {
                sleep(latency).await;
                log.lock()[index].finished_ms = Some(elapsed_ms(start));
                Ok::<_, Infallible>(search_catalog(&query))
            }
        },
    );

    script::play(start, events, |event| {
        search.set_query(event.query.as_str());
        if event.submit {
            search.submit();
        }
    })
    .await;

    // Wait out debounce, deferred retries and in-flight calls
    let settle = config.debounce.delay() + config.rate_limit.window() + latency;
    let mut rounds = 0;
    loop {
        sleep(settle).await;
        let state = search.snapshot();
        if !state.busy && state.backoff.is_none() && session.scheduled_count() == 0 {
            break;
        }
        rounds += 1;
        if rounds >= MAX_SETTLE_ROUNDS {
            anyhow::bail!("Replay did not settle after {} rounds", rounds);
        }
        debug!(round = rounds, "Replay still settling");
    }

    let state = search.snapshot();
    let stats = search.stats();
    let report = ReplayReport {
        keystrokes: events.len(),
        elapsed_ms: events.last().map_or(0, |e| e.at_ms),
        dispatched: stats.dispatched,
        fetched: stats.fetched,
        joined: stats.joined,
        denied: stats.denied,
        final_query: state.query,
        final_results: state.results.unwrap_or_default(),
        fetches: fetches.lock().clone(),
    };

    session.dispose(DisposeOptions::purge());
    Ok(report)
}

fn search_catalog(query: &str) -> Vec<String> {
    CATALOG
        .iter()
        .filter(|name| name.contains(query))
        .map(|name| name.to_string())
        .collect()
}
