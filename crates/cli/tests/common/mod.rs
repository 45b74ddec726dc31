//! Common utilities for integration tests

pub mod cli;

// Re-export commonly used items
pub use cli::{CadenceCommand, CommandResult, TestEnv};
