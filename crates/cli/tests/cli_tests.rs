//! CLI integration tests

use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn poi(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "poi-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = poi(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Companion POI"), "Should show app name");
    assert!(stdout.contains("decode"), "Should show decode command");
    assert!(stdout.contains("simulate"), "Should show simulate command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = poi(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("poi"), "Should show binary name");
}

/// Test simulate subcommand help
#[test]
fn test_simulate_help() {
    let output = poi(&["simulate", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Simulate help should succeed");
    assert!(stdout.contains("--radius"), "Should show radius option");
    assert!(stdout.contains("--max-results"), "Should show max-results option");
    assert!(stdout.contains("--peer-status"), "Should show peer-status option");
    assert!(stdout.contains("--disconnected"), "Should show disconnected option");
}

/// Test decode of a reply payload with JSON output
#[test]
fn test_decode_reply_json() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"status": 0, "listOfPOIs": [{{"title": "Louvre", "distance": "800"}}]}}"#
    )
    .unwrap();

    let output = poi(&[
        "--format",
        "json",
        "decode",
        file.path().to_str().unwrap(),
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Decode should succeed");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["status"], "ok");
    assert_eq!(report["pois"][0]["title"], "Louvre");
    assert_eq!(report["pois"][0]["distance"], "800 m");
}

/// Test decode of a missing file fails
#[test]
fn test_decode_missing_file() {
    let output = poi(&["decode", "/nonexistent/payload.json"]);

    assert!(!output.status.success(), "Decode of missing file should fail");
}

/// Test simulate with a failing phone
#[test]
fn test_simulate_peer_failure_json() {
    let output = poi(&["--format", "json", "simulate", "--peer-status", "not-authorized"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Simulate should succeed");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["status"], "peer_location_not_authorized");
    assert_eq!(report["status_code"], 1);
}
