//! Config file lifecycle: path, create, set, get, validation

use crate::cadence;
use crate::common::TestEnv;
use anyhow::Result;

#[test]
fn test_missing_config_uses_defaults() -> Result<()> {
    let env = TestEnv::new()?;

    let result = cadence!(env, "config", "--get", "debounce.delay_ms").assert_success()?;
    assert_eq!(result.stdout.trim(), "300");
    assert!(!env.config_path().exists());

    Ok(())
}

#[test]
fn test_path_create_writes_defaults() -> Result<()> {
    let env = TestEnv::new()?;

    let result = cadence!(env, "config", "--path").assert_success()?;
    assert!(result.contains_stdout("File does not exist"));

    cadence!(env, "config", "--path", "--create").assert_success()?;
    assert!(env.config_path().exists());

    let contents = std::fs::read_to_string(env.config_path())?;
    assert!(contents.contains("[rate_limit]"));
    assert!(contents.contains("max_requests = 10"));

    Ok(())
}

#[test]
fn test_set_then_get_persists() -> Result<()> {
    let env = TestEnv::new()?;

    let result = cadence!(env, "config", "--set", "rate_limit.max_requests=3").assert_success()?;
    assert!(result.contains_stdout("rate_limit.max_requests"));

    let result = cadence!(env, "config", "--get", "rate_limit.max_requests").assert_success()?;
    assert_eq!(result.stdout.trim(), "3");

    let result = cadence!(env, "config", "--list").assert_success()?;
    assert!(result.contains_stdout("max_requests"));
    assert!(result.contains_stdout("Valid Ranges"));

    Ok(())
}

#[test]
fn test_out_of_range_value_is_rejected() -> Result<()> {
    let env = TestEnv::new()?;

    let result = cadence!(env, "config", "--set", "debounce.delay_ms=0").assert_failure()?;
    assert!(result.contains_stderr("out of range"));
    assert!(!env.config_path().exists());

    // max_wait must not be shorter than the debounce delay
    let result = cadence!(env, "config", "--set", "max_wait.max_wait_ms=100").assert_failure()?;
    assert!(result.contains_stderr("max_wait.max_wait_ms"));

    Ok(())
}

#[test]
fn test_unknown_key_and_malformed_assignment_fail() -> Result<()> {
    let env = TestEnv::new()?;

    let result = cadence!(env, "config", "--get", "debounce.max_ms").assert_failure()?;
    assert!(result.contains_stderr("Unknown config key"));

    let result = cadence!(env, "config", "--set", "debounce.delay_ms").assert_failure()?;
    assert!(result.contains_stderr("KEY=VALUE"));

    Ok(())
}

#[test]
fn test_corrupt_config_file_is_reported() -> Result<()> {
    let env = TestEnv::new()?;
    std::fs::create_dir_all(env.config_path().parent().unwrap())?;
    std::fs::write(env.config_path(), "[debounce\ndelay_ms = ")?;

    let result = cadence!(env, "config", "--list").assert_failure()?;
    assert!(result.contains_stderr("Invalid config file"));

    Ok(())
}
