//! Configuration management command
//!
//! Provides CLI interface to view and edit orchestration settings.

use crate::system_config;
use anyhow::{Context, Result};
use cadence_core::OrchestrationConfig;
use owo_colors::OwoColorize;

/// Every settable key, in display order
pub const KEYS: &[&str] = &[
    "debounce.delay_ms",
    "throttle.interval_ms",
    "max_wait.immediate",
    "max_wait.max_wait_ms",
    "rate_limit.max_requests",
    "rate_limit.window_ms",
    "api.latency_ms",
];

/// List all configuration values
pub async fn run_list() -> Result<()> {
    let config = system_config::load()?;
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    println!("{}", "Orchestration Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());

    println!("{}", "[debounce]".yellow());
    println!("  {} = {}", "delay_ms".cyan(), config.debounce.delay_ms);

    println!("\n{}", "[throttle]".yellow());
    println!("  {} = {}", "interval_ms".cyan(), config.throttle.interval_ms);

    println!("\n{}", "[max_wait]".yellow());
    println!("  {} = {}", "immediate".cyan(), config.max_wait.immediate);
    println!(
        "  {} = {} {}",
        "max_wait_ms".cyan(),
        config.max_wait.max_wait_ms,
        if config.max_wait.max_wait_ms == 0 {
            "(disabled)".dimmed().to_string()
        } else {
            String::new()
        }
    );

    println!("\n{}", "[rate_limit]".yellow());
    println!("  {} = {}", "max_requests".cyan(), config.rate_limit.max_requests);
    println!(
        "  {} = {} {}",
        "window_ms".cyan(),
        config.rate_limit.window_ms,
        format!(
            "({} calls per {}ms)",
            config.rate_limit.max_requests, config.rate_limit.window_ms
        )
        .dimmed()
    );

    println!("\n{}", "[api]".yellow());
    println!("  {} = {}", "latency_ms".cyan(), config.api.latency_ms);

    println!("\n{}", "Valid Ranges:".bold());
    println!("  delay_ms, interval_ms: 1-60,000");
    println!("  max_wait_ms: 0 (disabled) or delay_ms-600,000");
    println!("  max_requests: 1-10,000");
    println!("  window_ms: 1-3,600,000");
    println!("  latency_ms: 0-60,000");

    Ok(())
}

/// Get a single configuration value
pub async fn run_get(key: &str) -> Result<()> {
    let config = system_config::load()?;
    println!("{}", get_value(&config, key)?);
    Ok(())
}

/// Set a configuration value
pub async fn run_set(key: &str, value: &str) -> Result<()> {
    let mut config = system_config::load()?;
    set_value(&mut config, key, value)?;

    // Validate before saving
    config.validate().context("Invalid configuration value")?;

    system_config::save(&config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(create: bool) -> Result<()> {
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    if create && !config_path.exists() {
        system_config::init_if_missing()?;
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", system_config::example_config());
    Ok(())
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Unknown config key: {}. Valid keys: {}",
        key,
        KEYS.join(", ")
    )
}

pub fn get_value(config: &OrchestrationConfig, key: &str) -> Result<String> {
    let value = match key {
        "debounce.delay_ms" => config.debounce.delay_ms.to_string(),
        "throttle.interval_ms" => config.throttle.interval_ms.to_string(),
        "max_wait.immediate" => config.max_wait.immediate.to_string(),
        "max_wait.max_wait_ms" => config.max_wait.max_wait_ms.to_string(),
        "rate_limit.max_requests" => config.rate_limit.max_requests.to_string(),
        "rate_limit.window_ms" => config.rate_limit.window_ms.to_string(),
        "api.latency_ms" => config.api.latency_ms.to_string(),
        _ => return Err(unknown_key(key)),
    };
    Ok(value)
}

pub fn set_value(config: &mut OrchestrationConfig, key: &str, value: &str) -> Result<()> {
    fn millis(value: &str) -> Result<u64> {
        value
            .parse()
            .context("Invalid value: must be a non-negative integer (milliseconds)")
    }

    match key {
        "debounce.delay_ms" => config.debounce.delay_ms = millis(value)?,
        "throttle.interval_ms" => config.throttle.interval_ms = millis(value)?,
        "max_wait.immediate" => {
            config.max_wait.immediate = value
                .parse()
                .context("Invalid value: must be 'true' or 'false'")?;
        }
        "max_wait.max_wait_ms" => config.max_wait.max_wait_ms = millis(value)?,
        "rate_limit.max_requests" => {
            config.rate_limit.max_requests = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "rate_limit.window_ms" => config.rate_limit.window_ms = millis(value)?,
        "api.latency_ms" => config.api.latency_ms = millis(value)?,
        _ => return Err(unknown_key(key)),
    }
    Ok(())
}
