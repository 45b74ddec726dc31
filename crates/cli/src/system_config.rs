//! Location and persistence of the orchestration config file
//!
//! Resolution order:
//! 1. `$CADENCE_CONFIG` if set
//! 2. `<config dir>/cadence/config.toml` (e.g. `~/.config/cadence/config.toml`)
//!
//! A missing file is not an error: defaults are used.

use anyhow::{Context, Result};
use cadence_core::OrchestrationConfig;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "CADENCE_CONFIG";

pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("cadence").join("config.toml"))
}

/// Load the config file, falling back to defaults if it does not exist
pub fn load() -> Result<OrchestrationConfig> {
    let path = config_file_path().context("Could not determine config file path")?;

    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(OrchestrationConfig::default());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    OrchestrationConfig::from_toml_str(&contents)
        .with_context(|| format!("Invalid config file {}", path.display()))
}

/// Validate and write the config file, creating its directory if needed
pub fn save(config: &OrchestrationConfig) -> Result<()> {
    config.validate().context("Refusing to save invalid configuration")?;

    let path = config_file_path().context("Could not determine config file path")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let contents = config.to_toml_string()?;
    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;

    debug!(path = %path.display(), "Config saved");
    Ok(())
}

/// Write the default config unless a file already exists
pub fn init_if_missing() -> Result<PathBuf> {
    let path = config_file_path().context("Could not determine config file path")?;
    if !path.exists() {
        save(&OrchestrationConfig::default())?;
    }
    Ok(path)
}

/// Annotated example config
pub fn example_config() -> String {
    r#"# Cadence orchestration settings

[debounce]
# Quiet period after the last keystroke before a call fires (1-60000)
delay_ms = 300

[throttle]
# Minimum spacing between throttled invocations (1-60000)
interval_ms = 1000

[max_wait]
# Fire the first call of a burst immediately
immediate = false
# Force a fire at least this often during continuous input (0 = disabled)
max_wait_ms = 1000

[rate_limit]
# Calls admitted per sliding window (1-10000)
max_requests = 10
# Window length (1-3600000)
window_ms = 1000

[api]
# Simulated backend latency used by `cadence replay` (0-60000)
latency_ms = 120
"#
    .to_string()
}
