//! `cadence replay` and `cadence schedule` on recorded keystroke scripts

use crate::cadence;
use crate::common::TestEnv;
use anyhow::Result;

const TYPING_RUST: &str = r#"[
    { "at_ms": 0,   "query": "r" },
    { "at_ms": 60,  "query": "ru" },
    { "at_ms": 120, "query": "rus" },
    { "at_ms": 180, "query": "rust" }
]"#;

#[test]
fn test_replay_collapses_typing_into_one_call() -> Result<()> {
    let env = TestEnv::new()?;
    let script = env.write("typing.json", TYPING_RUST)?;
    let script = script.as_str();

    let result = cadence!(env, "replay", script, "--json").assert_success()?;
    let report = result.json()?;

    assert_eq!(report["keystrokes"], 4);
    assert_eq!(report["fetched"], 1);
    assert_eq!(report["fetches"][0]["query"], "rust");
    // Default debounce 300ms after the last keystroke at 180ms
    assert_eq!(report["fetches"][0]["started_ms"], 480);
    assert_eq!(report["final_results"][1], "rustc");

    let result = cadence!(env, "replay", script).assert_success()?;
    assert!(result.contains_stdout("Fetched:"));
    assert!(result.contains_stdout("rust-analyzer"));

    Ok(())
}

#[test]
fn test_replay_defers_denied_queries() -> Result<()> {
    let env = TestEnv::new()?;
    cadence!(env, "config", "--set", "rate_limit.max_requests=1").assert_success()?;
    cadence!(env, "config", "--set", "debounce.delay_ms=100").assert_success()?;
    let script = env.write(
        "two_searches.json",
        r#"[{ "at_ms": 0, "query": "se" }, { "at_ms": 500, "query": "serde" }]"#,
    )?;

    let result = cadence!(env, "replay", script.as_str(), "--json").assert_success()?;
    let report = result.json()?;

    assert_eq!(report["denied"], 1);
    assert_eq!(report["fetched"], 2);
    assert_eq!(report["fetches"][1]["started_ms"], 1100);
    assert_eq!(report["final_query"], "serde");

    Ok(())
}

#[test]
fn test_schedule_strategies_differ() -> Result<()> {
    let env = TestEnv::new()?;
    let script = env.write("typing.json", TYPING_RUST)?;
    let script = script.as_str();

    let debounce = cadence!(env, "schedule", script, "--strategy", "debounce", "--json")
        .assert_success()?
        .json()?;
    assert_eq!(debounce["fires"].as_array().map(Vec::len), Some(1));
    assert_eq!(debounce["fires"][0]["query"], "rust");

    let throttle = cadence!(env, "schedule", script, "--strategy", "throttle", "--json")
        .assert_success()?
        .json()?;
    assert_eq!(throttle["strategy"], "throttle");
    assert_eq!(throttle["fires"][0]["at_ms"], 0);
    assert_eq!(throttle["fires"][0]["query"], "r");

    Ok(())
}

#[test]
fn test_bad_scripts_are_rejected() -> Result<()> {
    let env = TestEnv::new()?;

    let missing = env.arg_path("missing.json");
    let result = cadence!(env, "replay", missing.as_str()).assert_failure()?;
    assert!(result.contains_stderr("Failed to read script"));

    let unordered = env.write(
        "unordered.json",
        r#"[{ "at_ms": 50, "query": "b" }, { "at_ms": 10, "query": "a" }]"#,
    )?;
    let result = cadence!(env, "schedule", unordered.as_str()).assert_failure()?;
    assert!(result.contains_stderr("out of order"));

    Ok(())
}

#[test]
fn test_log_file_receives_warnings() -> Result<()> {
    let env = TestEnv::new()?;
    cadence!(env, "config", "--set", "rate_limit.max_requests=1").assert_success()?;
    let script = env.write(
        "two_searches.json",
        r#"[{ "at_ms": 0, "query": "se" }, { "at_ms": 500, "query": "serde" }]"#,
    )?;
    let log = env.arg_path("cadence.log");

    cadence!(
        env,
        "replay",
        script.as_str(),
        "--log-file",
        log.as_str()
    )
    .assert_success()?;

    let contents = std::fs::read_to_string(&log)?;
    assert!(contents.contains("rate limited"));

    Ok(())
}
