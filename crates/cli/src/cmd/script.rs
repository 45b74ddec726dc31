//! Recorded keystroke scripts
//!
//! A script is a JSON array of events ordered by time:
//!
//! ```json
//! [
//!   { "at_ms": 0,   "query": "r" },
//!   { "at_ms": 90,  "query": "ru" },
//!   { "at_ms": 900, "query": "rust", "submit": true }
//! ]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptEvent {
    /// Offset from the start of the replay
    pub at_ms: u64,
    /// Full text of the input after the keystroke
    pub query: String,
    /// Enter pressed after the keystroke
    #[serde(default)]
    pub submit: bool,
}

pub fn load(path: &Path) -> Result<Vec<ScriptEvent>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse(&contents).with_context(|| format!("Invalid script {}", path.display()))
}

pub fn parse(contents: &str) -> Result<Vec<ScriptEvent>> {
    let events: Vec<ScriptEvent> = serde_json::from_str(contents)?;

    if events.is_empty() {
        anyhow::bail!("Script has no events");
    }
    if let Some(pair) = events.windows(2).find(|pair| pair[1].at_ms < pair[0].at_ms) {
        anyhow::bail!(
            "Events out of order: {}ms comes after {}ms",
            pair[1].at_ms,
            pair[0].at_ms
        );
    }

    Ok(events)
}

/// Feed `events` to `on_event` at their offsets from `start`
pub async fn play(start: Instant, events: &[ScriptEvent], mut on_event: impl FnMut(&ScriptEvent)) {
    for event in events {
        sleep_until(start + Duration::from_millis(event.at_ms)).await;
        on_event(event);
    }
}

pub fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
