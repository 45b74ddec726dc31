//! Cadence CLI - cadence command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod system_config;

use cmd::limiter::LimiterArgs;
use cmd::schedule::Strategy;

/// Cadence - Tune request orchestration for bursty UI input
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a keystroke script through search-as-you-type
    Replay {
        /// JSON script: [{"at_ms": 0, "query": "r"}, ...]
        script: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show when a scheduling strategy fires for a keystroke script
    Schedule {
        /// JSON script: [{"at_ms": 0, "query": "r"}, ...]
        script: PathBuf,
        /// Strategy to simulate
        #[arg(short, long, value_enum, default_value = "debounce")]
        strategy: Strategy,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Simulate admissions against the rate limit
    Limiter {
        /// Number of call attempts
        #[arg(short = 'n', long, default_value = "20")]
        attempts: usize,
        /// Milliseconds between attempts
        #[arg(short, long, default_value = "50")]
        spacing_ms: u64,
        /// Override rate_limit.max_requests
        #[arg(long)]
        max_requests: Option<usize>,
        /// Override rate_limit.window_ms
        #[arg(long)]
        window_ms: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or edit configuration
    Config {
        /// List all configuration values
        #[arg(long, conflicts_with_all = ["get", "set", "path", "example"])]
        list: bool,

        /// Get a configuration value (e.g., rate_limit.max_requests)
        #[arg(long, value_name = "KEY")]
        get: Option<String>,

        /// Set a configuration value (e.g., debounce.delay_ms=250)
        #[arg(long, value_name = "KEY=VALUE")]
        set: Option<String>,

        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Create the config file with defaults (with --path)
        #[arg(long, requires = "path")]
        create: bool,

        /// Show an annotated example config
        #[arg(long)]
        example: bool,
    },
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default `warn` level. Logs go to stderr, and
/// also to `log_file` when given. The returned guard flushes the file
/// writer on drop.
fn init_tracing(
    log_file: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref())?;

    // Simulations run on virtual time from the first instant, so every
    // sleep lands exactly on its millisecond.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(run(cli.command))
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Replay { script, json } => cmd::replay::run(&script, json).await,
        Commands::Schedule { script, strategy, json } => {
            cmd::schedule::run(&script, strategy, json).await
        }
        Commands::Limiter { attempts, spacing_ms, max_requests, window_ms, json } => {
            cmd::limiter::run(LimiterArgs {
                attempts,
                spacing_ms,
                max_requests,
                window_ms,
                json,
            })
            .await
        }
        Commands::Config { get, set, path, create, example, .. } => {
            if let Some(key) = get {
                cmd::config::run_get(&key).await
            } else if let Some(assignment) = set {
                let (key, value) = assignment
                    .split_once('=')
                    .context("Expected KEY=VALUE, e.g. debounce.delay_ms=250")?;
                cmd::config::run_set(key.trim(), value.trim()).await
            } else if path {
                cmd::config::run_path(create).await
            } else if example {
                cmd::config::run_example().await
            } else {
                // --list is the default
                cmd::config::run_list().await
            }
        }
    }
}
