//! CLI integration tests

use std::process::Command;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "gcbdr-cli", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Backup job anomaly monitor"),
        "Should show app description"
    );
    assert!(stdout.contains("analyze"), "Should show analyze command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "gcbdr-cli", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("gcbdr-monitor"), "Should show binary name");
}

/// Test analyze subcommand help
#[test]
fn test_analyze_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "gcbdr-cli", "--", "analyze", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "analyze help should succeed");
    assert!(stdout.contains("--events-dir"), "Should show events-dir option");
    assert!(stdout.contains("--filter"), "Should show filter option");
    assert!(stdout.contains("--source-type"), "Should show source-type option");
}

/// Test a full run over an exported log directory
#[test]
fn test_analyze_json_output() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let lines = [
        r#"{"timestamp":"2024-03-05T01:00:00Z","payload":{"jobId":"h1","jobStatus":"SUCCESSFUL","sourceResourceName":"prod-sql-db-1","bytesTransferred":100}}"#,
        r#"{"timestamp":"2024-03-07T06:00:00Z","payload":{"jobId":"c1","jobStatus":"SUCCESSFUL","sourceResourceName":"prod-sql-db-1","bytesTransferred":400}}"#,
    ];
    std::fs::write(dir.path().join("vault.jsonl"), lines.join("\n"))
        .expect("Failed to write events");

    let output = Command::new("cargo")
        .args(["run", "-p", "gcbdr-cli", "--", "--format", "json", "analyze"])
        .arg("--events-dir")
        .arg(dir.path())
        .args(["--now", "2024-03-08T00:00:00Z", "--filter", "sql"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "analyze should succeed");
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["job_counts"]["total"], 2);
    assert_eq!(report["anomalies"][0]["job_id"], "c1");
    assert_eq!(report["anomalies"][0]["reasons"][0], "Size Spike (4.0x avg)");
}

/// Test that an invalid source type is rejected
#[test]
fn test_analyze_rejects_unknown_source() {
    let output = Command::new("cargo")
        .args(["run", "-p", "gcbdr-cli", "--", "analyze", "--source-type", "gcb"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "unknown source type should fail");
}

/// Test that a history span past the calendar is reported, not a crash
#[test]
fn test_analyze_rejects_unrepresentable_days() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let output = Command::new("cargo")
        .args(["run", "-p", "gcbdr-cli", "--", "analyze", "--days", "4294967295"])
        .arg("--events-dir")
        .arg(dir.path())
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "should exit with an error, not a panic");
    assert!(stderr.contains("Invalid --days"), "Should explain the bad window");
}
