//! Show when a scheduling strategy would fire for a keystroke script
//!
//! Useful for picking between debounce, throttle and debounce-with-max-wait
//! (and tuning their settings) before wiring one into an interaction.

use super::script::{self, elapsed_ms, ScriptEvent};
use crate::system_config;
use anyhow::Result;
use cadence_core::OrchestrationConfig;
use clap::ValueEnum;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use scheduler::MaxWaitOptions;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One trailing call after `debounce.delay_ms` of quiet
    Debounce,
    /// At most one call per `throttle.interval_ms`
    Throttle,
    /// Debounce with `[max_wait]` (leading call, forced fires)
    MaxWait,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fire {
    pub at_ms: u64,
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub strategy: Strategy,
    pub keystrokes: usize,
    pub fires: Vec<Fire>,
}

pub async fn run(path: &Path, strategy: Strategy, json: bool) -> Result<()> {
    let config = system_config::load()?;
    let events = script::load(path)?;

    let report = simulate(&config, strategy, &events).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {:?}, {} keystrokes -> {} calls\n",
        "Strategy:".bold(),
        strategy,
        report.keystrokes,
        report.fires.len()
    );
    for fire in &report.fires {
        println!(
            "  {}  {}",
            format!("{:>7}ms", fire.at_ms).dimmed(),
            format!("{:?}", fire.query).cyan()
        );
    }

    Ok(())
}

pub async fn simulate(
    config: &OrchestrationConfig,
    strategy: Strategy,
    events: &[ScriptEvent],
) -> ScheduleReport {
    let start = Instant::now();
    let fires: Arc<Mutex<Vec<Fire>>> = Arc::default();

    let sink = Arc::clone(&fires);
    let operation = move |query: String| {
        sink.lock().push(Fire {
            at_ms: elapsed_ms(start),
            query,
        });
    };

    let trigger: Box<dyn Fn(String)> = match strategy {
        Strategy::Debounce => {
            let debounced = scheduler::debounce(operation, config.debounce.delay());
            Box::new(move |query| debounced.call(query))
        }
        Strategy::Throttle => {
            let throttled = scheduler::throttle(operation, config.throttle.interval());
            Box::new(move |query| throttled.call(query))
        }
        Strategy::MaxWait => {
            let options = MaxWaitOptions {
                immediate: config.max_wait.immediate,
                max_wait: config.max_wait.max_wait(),
            };
            let debounced =
                scheduler::debounce_with_max_wait(operation, config.debounce.delay(), options);
            Box::new(move |query| debounced.call(query))
        }
    };

    script::play(start, events, |event| trigger(event.query.clone())).await;

    // Long enough for any trailing or forced fire
    let tail = config
        .debounce
        .delay()
        .max(config.throttle.interval())
        .max(config.max_wait.max_wait().unwrap_or_default());
    sleep(tail + Duration::from_millis(1)).await;

    let fires = fires.lock().clone();
    ScheduleReport {
        strategy,
        keystrokes: events.len(),
        fires,
    }
}
