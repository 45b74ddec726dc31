//! Core building blocks for Cadence request orchestration
//!
//! This crate provides:
//! - Sliding-window rate limiter (admission control with back-off reporting)
//! - Request deduplicator (collapses concurrent identical requests)
//! - Orchestration configuration (TOML, validated ranges)
//!
//! Everything here is in-memory and owned by a single instance. Nothing is
//! persisted and nothing is process-global.

pub mod config;
pub mod dedup;
pub mod limiter;

// Re-exports
pub use config::{ConfigError, OrchestrationConfig};
pub use dedup::{DedupError, RequestDeduplicator, SharedOperation, WeakDeduplicator};
pub use limiter::RateLimiter;
