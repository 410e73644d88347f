use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn issuecrawl() -> Command {
    let mut cmd = Command::cargo_bin("issuecrawl").unwrap();
    cmd.env_remove("ISSUECRAWL_DB")
        .env_remove("ISSUECRAWL_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, body).unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

const VALID: &str = r#"{
    "delay_ms": 0,
    "trackers": [
        {"name": "core-bugs", "backend": "bugzilla", "url": "https://bugzilla.example.org", "project": "Core"},
        {"name": "ops", "backend": "redmine", "url": "https://redmine.example.org", "token": "k", "page_size": 10}
    ]
}"#;

#[test]
fn version_json() {
    let output = issuecrawl().args(["version", "--json"]).output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["backends"].as_array().unwrap().iter().any(|b| b == "gerrit"));
}

#[test]
fn check_config_lists_trackers() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), VALID);
    let db = dir.path().join("crawl.db");

    let output = issuecrawl()
        .arg("check-config")
        .arg("--json")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();

    assert!(output.status.success());
    let json = stdout_json(&output);
    let trackers = json["trackers"].as_array().unwrap();
    assert_eq!(trackers.len(), 2);
    assert_eq!(trackers[1]["page_size"], 10);
    assert_eq!(trackers[1]["has_token"], true);
    assert_eq!(trackers[0]["url"], "https://bugzilla.example.org/");
    // Nothing is written by a configuration check.
    assert!(!db.exists());
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"{"trackers": [
            {"name": "a", "backend": "redmine", "url": "https://r.example.org"},
            {"name": "a", "backend": "redmine", "url": "https://r2.example.org"}]}"#,
    );

    issuecrawl()
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(4);
}

#[test]
fn missing_config_file_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let output = issuecrawl()
        .arg("crawl")
        .arg("--json")
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"]["code"], "CONFIG_ERROR");
}

#[test]
fn status_without_database_is_not_initialized() {
    let dir = TempDir::new().unwrap();
    issuecrawl()
        .arg("status")
        .arg("--db")
        .arg(dir.path().join("none.db"))
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(2);
}

#[test]
fn unknown_tracker_selection_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), VALID);
    issuecrawl()
        .args(["crawl", "--tracker", "nope", "--config"])
        .arg(&config)
        .arg("--db")
        .arg(dir.path().join("crawl.db"))
        .assert()
        .code(4);
}

#[test]
fn unreachable_tracker_is_fatal_and_database_stays_usable() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"{"delay_ms": 0, "timeout_secs": 5,
            "retry": {"attempts": 0, "min_backoff_ms": 1, "max_backoff_ms": 1, "rate_limit_waits": 0},
            "trackers": [{"name": "local", "backend": "redmine", "url": "http://127.0.0.1:9"}]}"#,
    );
    let db = dir.path().join("data").join("crawl.db");

    let output = issuecrawl()
        .args(["crawl", "--json", "--config"])
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    let summary = stdout_json(&output);
    assert_eq!(summary["trackers"][0]["status"], "failed");
    assert!(db.exists());

    let status = issuecrawl()
        .args(["status", "--json", "--db"])
        .arg(&db)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(status.status.success());
    assert_eq!(stdout_json(&status)["trackers"].as_array().unwrap().len(), 0);
}

#[test]
fn completions_mention_binary() {
    let output = issuecrawl().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("issuecrawl"));
}
