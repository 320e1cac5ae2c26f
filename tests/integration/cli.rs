use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn write_config(contents: &str) -> (tempfile::TempDir, String) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mediagrid.yaml");
    fs::write(&path, contents).expect("write config");
    let path = path.to_string_lossy().into_owned();
    (dir, path)
}

#[test]
fn validate_accepts_a_minimal_config() {
    let (_dir, path) = write_config(
        r#"
version: "1"
server_url: "http://node1:8080"
services:
  - job_type: encode
    path: /encoder
"#,
    );

    Command::cargo_bin("mgrid")
        .expect("binary")
        .args(["validate", "--config", path.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("http://node1:8080"));
}

#[test]
fn validate_emits_resolved_settings_as_json() {
    let (_dir, path) = write_config(
        r#"
version: "1"
server_url: "http://node1:8080"
dispatch_interval_ms: 250
heartbeat_interval_secs: 0
"#,
    );

    let output = Command::cargo_bin("mgrid")
        .expect("binary")
        .args(["validate", "--config", path.as_str(), "--json"])
        .output()
        .expect("run validate");
    assert!(output.status.success());

    let payload: Value = serde_json::from_slice(&output.stdout).expect("parse json");
    assert_eq!(payload["server_url"], "http://node1:8080");
    // 250 ms clamps up to the one second floor.
    assert_eq!(payload["dispatch_interval"]["secs"], 1);
    // 0 disables the heartbeat entirely.
    assert!(payload["heartbeat_interval"].is_null());
    assert_eq!(payload["max_attempts"], 1);
}

#[test]
fn validate_rejects_unparseable_yaml() {
    let (_dir, path) = write_config("version: [unclosed\n");

    Command::cargo_bin("mgrid")
        .expect("binary")
        .args(["validate", "--config", path.as_str()])
        .assert()
        .failure();
}

#[test]
fn validate_fails_on_a_missing_file() {
    Command::cargo_bin("mgrid")
        .expect("binary")
        .args(["validate", "--config", "/nonexistent/mediagrid.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mediagrid.yaml"));
}

#[test]
fn an_invalid_log_level_is_rejected() {
    Command::cargo_bin("mgrid")
        .expect("binary")
        .args(["--log-level", "loudest", "validate"])
        .assert()
        .failure();
}
