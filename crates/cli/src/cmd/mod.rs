//! CLI command implementations

pub mod config;
pub mod limiter;
pub mod replay;
pub mod schedule;
pub mod script;
