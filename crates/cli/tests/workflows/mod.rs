//! Workflow integration tests
//!
//! Tests for complete workflows that exercise the `cadence` binary end to
//! end against an isolated config file.

pub mod config_edit;
pub mod limiter_simulation;
pub mod script_replay;
