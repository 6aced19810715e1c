//! Smoke tests for the vigil CLI
//!
//! Runs the binary end to end against the scripted driver and the fixture
//! suites in `tests/fixtures`.

#![allow(deprecated)] // Command::cargo_bin
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn vigil() -> Command {
    let mut cmd = Command::cargo_bin("vigil").expect("vigil binary should exist");
    cmd.env_remove("RUST_LOG")
        .env_remove("VIGIL_BASE_URL")
        .env_remove("VIGIL_COMMAND_TIMEOUT_MS")
        .env_remove("VIGIL_WORKERS");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn scripted_run(suite: &str) -> Command {
    let mut cmd = vigil();
    cmd.arg("run")
        .arg(fixture(suite))
        .args(["--driver", "scripted", "--site"])
        .arg(fixture("site.yaml"))
        .args(["--timeout", "1000", "--interval", "10", "--color", "never"]);
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    vigil()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    vigil()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_no_args_is_usage_error() {
    vigil().assert().code(2);
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_passing_suite() {
    scripted_run("home.yaml")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Home screen: 3/3 passed"))
        .stderr(predicate::str::contains("PASS Home screen redirect on click"));
}

#[test]
fn test_run_failing_suite_exits_one() {
    scripted_run("failing.yaml")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Broken home wrong title"))
        .stdout(predicate::str::contains("expected title equals \"Welcome\""));
}

#[test]
fn test_run_json_to_stdout_and_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("report.json");
    let assert = scripted_run("home.yaml")
        .args(["--format", "json", "--output"])
        .arg(&out)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("INFO report written to"));

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["results"].as_array().unwrap().len(), 3);
    assert_eq!(report["results"][0]["status"], "passed");

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["run_id"], report["run_id"]);
}

#[test]
fn test_run_filter_skips_others() {
    scripted_run("home.yaml")
        .args(["--filter", "title"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("1/3 passed"))
        .stdout(predicate::str::contains("2 skipped"));
}

#[test]
fn test_run_parallel() {
    scripted_run("home.yaml")
        .args(["-j", "3"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("3/3 passed"));
}

#[test]
fn test_run_invalid_suite_is_usage_error() {
    scripted_run("invalid.yaml")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid selector"));
}

#[test]
fn test_scripted_without_site_is_usage_error() {
    vigil()
        .arg("run")
        .arg(fixture("home.yaml"))
        .args(["--driver", "scripted"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--site"));
}

// ============================================================================
// validate / config
// ============================================================================

#[test]
fn test_validate_lists_titles() {
    vigil()
        .arg("validate")
        .arg(fixture("home.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("3 tests"))
        .stdout(predicate::str::contains("Home screen create button visible"));
}

#[test]
fn test_validate_strict_rejects_open_prefix() {
    vigil()
        .args(["validate", "--strict-selectors"])
        .arg(fixture("home.yaml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unterminated attribute value"));
}

#[test]
fn test_config_layers_file_and_env() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vigil.yaml");
    std::fs::write(&path, "base_url: http://localhost:9000\nworkers: 2\n").unwrap();

    vigil()
        .arg("config")
        .arg("--config")
        .arg(&path)
        .env("VIGIL_WORKERS", "4")
        .assert()
        .success()
        .stdout(predicate::str::contains("base_url: http://localhost:9000"))
        .stdout(predicate::str::contains("workers: 4"));
}
