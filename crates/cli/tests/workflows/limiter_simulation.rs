//! `cadence limiter` against configured and overridden limits

use crate::cadence;
use crate::common::TestEnv;
use anyhow::Result;

#[test]
fn test_burst_is_capped_by_window() -> Result<()> {
    let env = TestEnv::new()?;

    let result = cadence!(
        env,
        "limiter",
        "--attempts",
        "5",
        "--spacing-ms",
        "100",
        "--max-requests",
        "3",
        "--window-ms",
        "1000",
        "--json"
    )
    .assert_success()?;

    let report = result.json()?;
    assert_eq!(report["admitted"], 3);
    assert_eq!(report["denied"], 2);
    assert_eq!(report["attempts"][3]["at_ms"], 300);
    assert_eq!(report["attempts"][3]["retry_in_ms"], 700);

    Ok(())
}

#[test]
fn test_attempts_land_on_exact_spacing() -> Result<()> {
    let env = TestEnv::new()?;

    // Second attempt is 1000ms after the first, still inside a 1001ms window
    let result = cadence!(
        env,
        "limiter",
        "-n",
        "2",
        "--spacing-ms",
        "1000",
        "--max-requests",
        "1",
        "--window-ms",
        "1001",
        "--json"
    )
    .assert_success()?;

    let report = result.json()?;
    assert_eq!(report["attempts"][1]["at_ms"], 1000);
    assert_eq!(report["admitted"], 1);
    assert_eq!(report["denied"], 1);
    assert_eq!(report["attempts"][1]["retry_in_ms"], 1);

    let spaced = cadence!(env, "limiter", "-n", "5", "--spacing-ms", "100", "--json")
        .assert_success()?
        .json()?;
    let times: Vec<u64> = spaced["attempts"]
        .as_array()
        .map(|attempts| attempts.iter().filter_map(|a| a["at_ms"].as_u64()).collect())
        .unwrap_or_default();
    assert_eq!(times, vec![0, 100, 200, 300, 400]);

    Ok(())
}

#[test]
fn test_uses_configured_limit() -> Result<()> {
    let env = TestEnv::new()?;
    cadence!(env, "config", "--set", "rate_limit.max_requests=2").assert_success()?;

    let result = cadence!(env, "limiter", "-n", "4", "--spacing-ms", "10").assert_success()?;
    assert!(result.contains_stdout("Admitted: 2"));
    assert!(result.contains_stdout("Denied:   2"));

    Ok(())
}

#[test]
fn test_long_simulation_runs_on_virtual_time() -> Result<()> {
    let env = TestEnv::new()?;

    // Ten minutes of simulated attempts
    let result = cadence!(env, "limiter", "-n", "600", "--spacing-ms", "1000", "--json")
        .assert_success()?;
    assert!(result.duration.as_secs() < 30);
    assert_eq!(result.json()?["denied"], 0);

    Ok(())
}

#[test]
fn test_invalid_override_is_rejected() -> Result<()> {
    let env = TestEnv::new()?;

    let result = cadence!(env, "limiter", "--max-requests", "0").assert_failure()?;
    assert!(result.contains_stderr("rate_limit.max_requests"));

    Ok(())
}
