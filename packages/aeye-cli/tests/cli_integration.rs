use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Command with an isolated config file so a user config never leaks in
fn aeye(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("aeye").unwrap();
    cmd.env("AEYE_CONFIG", config);
    cmd
}

fn workspace(config_yaml: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, config_yaml).unwrap();
    (dir, config)
}

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8(output.stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    let (_dir, config) = workspace("");
    aeye(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    let (_dir, config) = workspace("");
    aeye(&config)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("aeye"));
}

#[test]
fn test_missing_config_is_invalid_args() {
    let (dir, _config) = workspace("");
    aeye(&dir.path().join("absent.yaml"))
        .arg("info")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_dir, config) = workspace("gaze:\n  mark_freq: 0\n");
    aeye(&config)
        .arg("info")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mark_freq"));
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_text() {
    let (_dir, config) = workspace("");
    aeye(&config)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Serial number:"))
        .stdout(predicate::str::contains("SIM-"))
        .stdout(predicate::str::contains("90 Hz"));
}

#[test]
fn test_info_json_with_expired_license() {
    let (dir, config) = workspace("");
    let license = dir.path().join("aeye.license");
    std::fs::write(&license, "AEYE-LICENSE\nexpires=2001-01-01\n").unwrap();
    std::fs::write(
        &config,
        format!("license_path: {}\n", license.display()),
    )
    .unwrap();

    let output = aeye(&config)
        .args(["info", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let info = json_stdout(&output);
    assert_eq!(info["device"]["session_level"], "standard");
    assert_eq!(info["license"], "expired (standard session)");
    assert_eq!(info["config"]["gaze"]["buffer_capacity"], 450000);
}

// =============================================================================
// STREAM SUBCOMMAND
// =============================================================================

#[test]
fn test_stream_exports_labelled_rows() {
    let (dir, config) = workspace("");
    let export = dir.path().join("gaze.csv");

    let output = aeye(&config)
        .args(["stream", "--duration", "0.4", "--rate", "200", "--samples", "10"])
        .args(["--label", "reading", "--json", "--export"])
        .arg(&export)
        .assert()
        .success()
        .get_output()
        .clone();

    let summary = json_stdout(&output);
    assert_eq!(summary["exported"]["written"], 10);
    assert!(summary["stats"]["samples_enqueued"].as_u64().unwrap() >= 10);
    assert_eq!(summary["output_frequency_hz"], 200.0);

    let text = std::fs::read_to_string(&export).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 10);
    assert!(lines.iter().all(|l| l.ends_with(", reading")));
    assert!(lines.iter().all(|l| l.split(", ").count() == 34));
}

#[test]
fn test_stream_drops_invalid_samples() {
    let (_dir, config) = workspace("");
    let output = aeye(&config)
        .args(["stream", "--duration", "0.3", "--rate", "200", "--invalid-every", "2", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let stats = &json_stdout(&output)["stats"];
    let dropped = stats["invalid_dropped"].as_u64().unwrap();
    let enqueued = stats["samples_enqueued"].as_u64().unwrap();
    assert!(dropped > 0);
    assert!(enqueued.abs_diff(dropped) <= 1);
}

#[test]
fn test_stream_text_summary() {
    let (_dir, config) = workspace("");
    aeye(&config)
        .args(["stream", "--duration", "0.2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Samples:"))
        .stdout(predicate::str::contains("Marks placed:"));
}

#[test]
fn test_stream_replays_export() {
    let (dir, config) = workspace("");
    let export = dir.path().join("recorded.csv");

    aeye(&config)
        .args(["stream", "--duration", "0.3", "--rate", "200", "--export"])
        .arg(&export)
        .assert()
        .success();

    let output = aeye(&config)
        .args(["stream", "--duration", "0.2", "--rate", "500", "--json", "--replay"])
        .arg(&export)
        .assert()
        .success()
        .get_output()
        .clone();

    let summary = json_stdout(&output);
    assert!(summary["device"].as_str().unwrap().starts_with("replay://"));
    assert!(summary["stats"]["samples_enqueued"].as_u64().unwrap() > 0);
}

#[test]
fn test_stream_missing_replay_is_device_error() {
    let (dir, config) = workspace("");
    aeye(&config)
        .args(["stream", "--duration", "0.1", "--replay"])
        .arg(dir.path().join("absent.csv"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_stream_label_requires_export() {
    let (_dir, config) = workspace("");
    aeye(&config)
        .args(["stream", "--label", "x"])
        .assert()
        .code(2);
}

// =============================================================================
// CALIBRATION SUBCOMMAND
// =============================================================================

#[test]
fn test_calibration_save_then_apply() {
    let (dir, config) = workspace("");
    let cal = dir.path().join("tracker.cal");

    aeye(&config)
        .args(["calibration", "save", "--file"])
        .arg(&cal)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved"));
    assert!(cal.exists());

    aeye(&config)
        .args(["calibration", "apply", "--file"])
        .arg(&cal)
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied"));
}

#[test]
fn test_calibration_apply_rejects_foreign_blob() {
    let (dir, config) = workspace("");
    let cal = dir.path().join("other.cal");
    std::fs::write(&cal, b"not a calibration").unwrap();

    aeye(&config)
        .args(["calibration", "apply", "--file"])
        .arg(&cal)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to apply calibration"));
}

// =============================================================================
// RECORD SUBCOMMAND
// =============================================================================

#[test]
fn test_record_counts_stdin_events() {
    let (dir, config) = workspace("event_log:\n  writeback_secs: 0.1\n  writeafter_secs: 0.1\n");
    let logs = dir.path().join("logs");

    aeye(&config)
        .args(["record", "--duration", "2", "--out-dir"])
        .arg(&logs)
        .write_stdin("key\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 events"));

    assert!(logs.is_dir());
}
