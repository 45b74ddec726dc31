//! Simulate admissions against the rate limit
//!
//! Runs on a paused clock, so a simulation spanning minutes finishes
//! instantly and always prints the same timeline.

use crate::system_config;
use anyhow::{Context, Result};
use cadence_core::RateLimiter;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy)]
pub struct LimiterArgs {
    pub attempts: usize,
    pub spacing_ms: u64,
    pub max_requests: Option<usize>,
    pub window_ms: Option<u64>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Attempt {
    at_ms: u64,
    admitted: bool,
    /// Free slots after the attempt
    remaining: usize,
    /// Back-off reported when denied
    retry_in_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct Report {
    max_requests: usize,
    window_ms: u64,
    admitted: usize,
    denied: usize,
    attempts: Vec<Attempt>,
}

pub async fn run(args: LimiterArgs) -> Result<()> {
    let mut config = system_config::load()?;
    if let Some(max_requests) = args.max_requests {
        config.rate_limit.max_requests = max_requests;
    }
    if let Some(window_ms) = args.window_ms {
        config.rate_limit.window_ms = window_ms;
    }
    config.validate().context("Invalid rate limit")?;

    let report = simulate(
        &RateLimiter::from_config(&config.rate_limit),
        args.attempts,
        Duration::from_millis(args.spacing_ms),
    )
    .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {} calls per {}ms, {} attempts every {}ms\n",
        "Rate limit:".bold(),
        report.max_requests,
        report.window_ms,
        args.attempts,
        args.spacing_ms
    );

    for (i, attempt) in report.attempts.iter().enumerate() {
        let time = format!("{:>7}ms", attempt.at_ms);
        if attempt.admitted {
            println!(
                "  {}  #{:<4} {}  {}",
                time.dimmed(),
                i + 1,
                "admitted".green(),
                format!("({} left)", attempt.remaining).dimmed()
            );
        } else {
            println!(
                "  {}  #{:<4} {}  {}",
                time.dimmed(),
                i + 1,
                "denied".red(),
                format!("(retry in {}ms)", attempt.retry_in_ms.unwrap_or_default()).dimmed()
            );
        }
    }

    println!();
    println!("Admitted: {}", report.admitted);
    println!("Denied:   {}", report.denied);

    Ok(())
}

async fn simulate(limiter: &RateLimiter, attempts: usize, spacing: Duration) -> Report {
    let start = Instant::now();
    let mut log = Vec::with_capacity(attempts);

    for i in 0..attempts {
        if i > 0 {
            sleep(spacing).await;
        }
        let admitted = limiter.record_request();
        log.push(Attempt {
            at_ms: start.elapsed().as_millis() as u64,
            admitted,
            remaining: limiter.remaining(),
            retry_in_ms: (!admitted)
                .then(|| limiter.time_until_next_request().as_millis() as u64),
        });
    }

    let admitted = log.iter().filter(|a| a.admitted).count();
    Report {
        max_requests: limiter.max_requests(),
        window_ms: limiter.time_window().as_millis() as u64,
        admitted,
        denied: log.len() - admitted,
        attempts: log,
    }
}
