//! Orchestration configuration
//!
//! Stored as TOML. Every section is optional; missing sections and keys
//! fall back to defaults tuned for search-as-you-type against a typical
//! REST backend.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{key} = {value} is out of range ({range})")]
    OutOfRange {
        key: &'static str,
        value: u64,
        range: String,
    },
}

/// Top-level orchestration configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub debounce: DebounceConfig,
    pub throttle: ThrottleConfig,
    pub max_wait: MaxWaitConfig,
    pub rate_limit: RateLimitConfig,
    pub api: ApiConfig,
}

/// `[debounce]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period before a trailing invocation fires (default: 300ms)
    pub delay_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { delay_ms: 300 }
    }
}

impl DebounceConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// `[throttle]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum spacing between invocations (default: 1000ms)
    pub interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl ThrottleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// `[max_wait]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxWaitConfig {
    /// Fire the first call of a burst immediately (default: false)
    pub immediate: bool,
    /// Upper bound between forced fires under continuous input, 0 disables
    /// (default: 1000ms)
    pub max_wait_ms: u64,
}

impl Default for MaxWaitConfig {
    fn default() -> Self {
        Self {
            immediate: false,
            max_wait_ms: 1000,
        }
    }
}

impl MaxWaitConfig {
    /// `None` when forced fires are disabled
    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait_ms > 0).then(|| Duration::from_millis(self.max_wait_ms))
    }
}

/// `[rate_limit]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions per window (default: 10)
    pub max_requests: usize,
    /// Window width (default: 1000ms)
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// `[api]` section, used by simulated backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Simulated round-trip latency (default: 120ms)
    pub latency_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { latency_ms: 120 }
    }
}

impl ApiConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl OrchestrationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML document
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value against its documented range
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("debounce.delay_ms", self.debounce.delay_ms, 1, 60_000)?;
        check_range("throttle.interval_ms", self.throttle.interval_ms, 1, 60_000)?;

        if self.max_wait.max_wait_ms != 0 {
            check_range(
                "max_wait.max_wait_ms",
                self.max_wait.max_wait_ms,
                self.debounce.delay_ms,
                600_000,
            )?;
        }

        check_range(
            "rate_limit.max_requests",
            self.rate_limit.max_requests as u64,
            1,
            10_000,
        )?;
        check_range("rate_limit.window_ms", self.rate_limit.window_ms, 1, 3_600_000)?;
        check_range("api.latency_ms", self.api.latency_ms, 0, 60_000)?;

        Ok(())
    }
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key,
            value,
            range: format!("{}-{}", min, max),
        });
    }
    Ok(())
}
