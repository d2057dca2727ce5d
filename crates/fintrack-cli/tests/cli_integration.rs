//! Integration tests for fintrack-cli
//!
//! These tests verify the CLI commands work end-to-end.
//! Each test gets its own data directory; tests run serially to keep
//! environment overrides from leaking between them.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the fintrack binary rooted at `data_dir`
fn fintrack(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fintrack").unwrap();
    cmd.env("FINTRACK_DATA_DIR", data_dir.path())
        .env_remove("FINTRACK_BACKEND")
        .env_remove("FINTRACK_PLANS_PATH")
        .env_remove("FINTRACK_DB_PATH")
        .env_remove("FINTRACK_UPSTREAM_TIMEOUT_SECS");
    cmd
}

fn data_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Write a plan catalog into the data directory
fn write_plans(data_dir: &TempDir, json: &str) {
    let config_dir = data_dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("account_types.json"), json).unwrap();
}

const KEY: &str = "AIzaSyTEST-0000-secret-key-abcd";

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
#[serial]
fn test_cli_help() {
    let dir = data_dir();
    fintrack(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fintrack"))
        .stdout(predicate::str::contains("COMMAND").or(predicate::str::contains("Commands")));
}

#[test]
#[serial]
fn test_cli_version() {
    let dir = data_dir();
    fintrack(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fintrack"));
}

#[test]
#[serial]
fn test_ai_plan_help() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["ai", "plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--income"));
}

// =============================================================================
// Keys Command Tests
// =============================================================================

#[test]
#[serial]
fn test_keys_add_and_list_masks_key() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["keys", "add", KEY, "--quota", "500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added key AIza...abcd"));

    fintrack(&dir)
        .args(["--format", "json", "keys", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AIza...abcd"))
        .stdout(predicate::str::contains("0/500"))
        .stdout(predicate::str::contains("eligible"))
        .stdout(predicate::str::contains("secret").not());

    // pool file uses the flat-file layout
    assert!(dir.path().join("config/gemini_keys.json").exists());
}

#[test]
#[serial]
fn test_keys_add_duplicate_fails() {
    let dir = data_dir();
    fintrack(&dir).args(["keys", "add", KEY]).assert().success();
    fintrack(&dir)
        .args(["keys", "add", KEY])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key exists"));
}

#[test]
#[serial]
fn test_keys_remove_and_reactivate_missing_fail() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["keys", "remove", "nope-nope-nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
    fintrack(&dir)
        .args(["keys", "reactivate", "nope-nope-nope"])
        .assert()
        .failure();
}

#[test]
#[serial]
fn test_keys_remove() {
    let dir = data_dir();
    fintrack(&dir).args(["keys", "add", KEY]).assert().success();
    fintrack(&dir)
        .args(["-q", "keys", "remove", KEY])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    fintrack(&dir)
        .args(["keys", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No keys configured"));
}

// =============================================================================
// Plans and Config Tests
// =============================================================================

#[test]
#[serial]
fn test_plans_list_builtin() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["--format", "json", "plans", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pro_plus"))
        .stdout(predicate::str::contains("enterprise"))
        .stdout(predicate::str::contains("unlimited"));
}

#[test]
#[serial]
fn test_plans_list_from_file() {
    let dir = data_dir();
    write_plans(&dir, r#"{"student": {"ai_monthly": 7, "ai_daily": 2, "voice_monthly": 0}}"#);
    fintrack(&dir)
        .args(["plans", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("student"))
        .stdout(predicate::str::contains("pro_plus").not());
}

#[test]
#[serial]
fn test_config_get() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["config", "get", "backend"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend = json"));
    fintrack(&dir)
        .args(["config", "get", "nonsense"])
        .assert()
        .failure();
}

// =============================================================================
// Gateway Request Tests
// =============================================================================

#[test]
#[serial]
fn test_ai_plan_without_keys_is_unavailable() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["ai", "plan", "--user", "anna", "--income", "1000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("temporarily unavailable"))
        .stderr(predicate::str::contains("502"));
}

#[test]
#[serial]
fn test_ai_plan_daily_limit_end_to_end() {
    let dir = data_dir();
    write_plans(&dir, r#"{"free": {"ai_monthly": 10, "ai_daily": 1, "voice_monthly": 0}}"#);
    fintrack(&dir).args(["keys", "add", KEY]).assert().success();

    fintrack(&dir)
        .args([
            "--format", "json", "ai", "plan", "--user", "anna", "--income", "1000", "--goal",
            "laptop",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"savings\": 200.0"))
        .stdout(predicate::str::contains("laptop"));

    fintrack(&dir)
        .args(["ai", "plan", "--user", "anna", "--income", "1000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tomorrow"))
        .stderr(predicate::str::contains("429"));

    fintrack(&dir)
        .args(["--format", "json", "usage", "show", "anna"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ai_today\": \"1/1\""))
        .stdout(predicate::str::contains("\"ai_month\": \"1/10\""));

    fintrack(&dir)
        .args(["--format", "json", "audit", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ai_calls_ok\": 1"))
        .stdout(predicate::str::contains("\"distinct_users\": 1"));

    fintrack(&dir)
        .args(["--format", "json", "audit", "resets", "--user", "anna"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ai_month"))
        .stdout(predicate::str::contains("ai_day"));
}

#[test]
#[serial]
fn test_ai_voice_gated_by_plan() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["ai", "voice", "--user", "anna", "--audio", "UklGRg=="])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Upgrade"))
        .stderr(predicate::str::contains("403"));

    fintrack(&dir)
        .args([
            "ai", "voice", "--user", "anna", "--plan", "pro_plus", "--audio", "UklGRg==",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("lunch 30k"));

    fintrack(&dir)
        .args(["--format", "json", "audit", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("voice_input"));
}

#[test]
#[serial]
fn test_ai_voice_requires_audio() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["ai", "voice", "--user", "anna"])
        .assert()
        .failure();
}

#[test]
#[serial]
fn test_sqlite_backend() {
    let dir = data_dir();
    fintrack(&dir)
        .args(["--backend", "sqlite", "keys", "add", KEY])
        .assert()
        .success();
    assert!(dir.path().join("fintrack.db").exists());
    assert!(!dir.path().join("config/gemini_keys.json").exists());

    fintrack(&dir)
        .args([
            "--backend", "sqlite", "ai", "plan", "--user", "anna", "--income", "500",
        ])
        .assert()
        .success();
    fintrack(&dir)
        .args(["--backend", "sqlite", "--format", "json", "keys", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/100000"));
}
