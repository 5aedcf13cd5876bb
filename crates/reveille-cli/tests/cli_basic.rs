//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against a throwaway home
//! directory and verify outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command with its data directory under `home`.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "reveille-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env("REVEILLE_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_alarm_add_and_list() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["alarm", "add", "07:30", "--label", "wake"]);
    assert_eq!(code, 0, "alarm add failed: {stdout}");
    assert!(stdout.contains("Alarm created:"));
    assert!(stdout.contains("Next occurrence:"));

    let (stdout, _, code) = run_cli(home.path(), &["alarm", "list"]);
    assert_eq!(code, 0, "alarm list failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["label"], "wake");
}

#[test]
fn test_alarm_add_rejects_bad_time() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["alarm", "add", "25:99"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_alarm_disable_and_delete() {
    let home = tempfile::tempdir().unwrap();
    run_cli(home.path(), &["alarm", "add", "06:00"]);

    let (stdout, _, code) = run_cli(home.path(), &["alarm", "disable", "1"]);
    assert_eq!(code, 0, "alarm disable failed: {stdout}");

    // Disabling removes the scheduled instance.
    let (stdout, _, _) = run_cli(home.path(), &["instance", "list"]);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(parsed.as_array().unwrap().is_empty());

    let (stdout, _, code) = run_cli(home.path(), &["alarm", "delete", "1"]);
    assert_eq!(code, 0, "alarm delete failed: {stdout}");
}

#[test]
fn test_engine_next() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["engine", "next"]);
    assert_eq!(code, 0, "engine next failed");
    assert!(stdout.contains("No upcoming alarm"));

    run_cli(home.path(), &["alarm", "add", "23:59"]);
    let (stdout, _, code) = run_cli(home.path(), &["engine", "next"]);
    assert_eq!(code, 0, "engine next failed");
    assert!(stdout.contains("alarm_time"));
}

#[test]
fn test_engine_fix_is_safe_on_empty_store() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["engine", "fix"]);
    assert_eq!(code, 0, "engine fix failed");
}

#[test]
fn test_config_show_and_set() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "show"]);
    assert_eq!(code, 0, "config show failed");
    assert!(stdout.contains("snooze_minutes"));

    let (stdout, _, code) = run_cli(home.path(), &["config", "set", "snooze_minutes", "5"]);
    assert_eq!(code, 0, "config set failed: {stdout}");

    let (stdout, _, _) = run_cli(home.path(), &["config", "show"]);
    assert!(stdout.contains("snooze_minutes = 5"));
}

#[test]
fn test_config_set_rejects_invalid() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "snooze_minutes", "0"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}
