mod common;

use common::{fixture_path, spawn_command};
use flowgen::error::ExitCode;

#[test]
fn validate_valid_suite() {
    let suite = fixture_path("load_balancer.yaml");
    let output = spawn_command(&["validate", suite.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "validate should succeed for a valid suite: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains(": ok"));
}

#[test]
fn validate_json_output() {
    let suite = fixture_path("load_balancer.yaml");
    let output = spawn_command(&["validate", "--format", "json", suite.to_str().unwrap()]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("output should be valid JSON");
    assert_eq!(parsed["valid"], true);
    assert!(parsed["warnings"].as_array().is_some_and(Vec::is_empty));
}

#[test]
fn validate_invalid_suite() {
    let suite = fixture_path("zero_weight.yaml");
    let output = spawn_command(&["validate", suite.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(ExitCode::CONFIG_ERROR));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("flows[0].weight"), "stderr: {stderr}");
}

#[test]
fn validate_unknown_flow_suggests() {
    let suite = fixture_path("unknown_flow.yaml");
    let output = spawn_command(&["validate", suite.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(ExitCode::CONFIG_ERROR));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("healthcheck"), "stderr: {stderr}");
}

#[test]
fn validate_missing_file() {
    let output = spawn_command(&["validate", "/tmp/nonexistent_flowgen_suite.yaml"]);
    assert_eq!(output.status.code(), Some(ExitCode::IO_ERROR));
}

#[test]
fn run_idle_suite_writes_events_and_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let events_path = tmp.path().join("events.jsonl");
    let suite = fixture_path("idle.yaml");

    let output = spawn_command(&[
        "run",
        "--suite",
        suite.to_str().unwrap(),
        "--events-file",
        events_path.to_str().unwrap(),
        "--finish-timeout",
        "100ms",
    ]);
    assert!(
        output.status.success(),
        "run should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Starting suite idle"), "stdout: {stdout}");
    assert!(stdout.contains("Starting phase \"Quiet\""), "stdout: {stdout}");
    assert!(stdout.contains("Phase \"Still Quiet\" finished"), "stdout: {stdout}");
    assert!(stdout.contains("Suite Summary:"), "stdout: {stdout}");
    assert!(stdout.contains("requests: 0"), "stdout: {stdout}");

    let contents = std::fs::read_to_string(&events_path).expect("events file should exist");
    let types: Vec<String> = contents
        .lines()
        .map(|l| {
            let value: serde_json::Value = serde_json::from_str(l).unwrap();
            value["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        types,
        vec![
            "suite_started",
            "phase_started",
            "phase_finished",
            "phase_started",
            "phase_finished",
            "suite_finished",
        ]
    );
}

#[test]
fn run_quiet_suppresses_summary() {
    let suite = fixture_path("idle.yaml");
    let output = spawn_command(&["--quiet", "run", "--suite", suite.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn run_missing_suite_fails() {
    let output = spawn_command(&["run", "--suite", "/tmp/nonexistent_flowgen_suite.yaml"]);
    assert_eq!(output.status.code(), Some(ExitCode::CONFIG_ERROR));
}

#[test]
fn version_json() {
    let output = spawn_command(&["version", "--format", "json"]);
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&output.stdout).trim()).unwrap();
    assert_eq!(parsed["name"], "flowgen");
    assert_eq!(parsed["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn usage_error_exit_code() {
    let output = spawn_command(&["run"]);
    assert_eq!(output.status.code(), Some(2));
}
