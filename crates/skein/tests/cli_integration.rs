//! CLI integration tests for the Skein command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Argument parsing works as expected
//! - Bad entries and configs fail with messages naming the problem
//!
//! None of them needs a reachable tool server.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the skein binary.
fn skein() -> Command {
    let mut cmd = Command::cargo_bin("skein").unwrap();
    cmd.env_remove("SKEIN_LOG_DIR").env_remove("SKEIN_TOKEN");
    cmd
}

fn write_entry(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("entry.json");
    std::fs::write(&path, contents).unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    skein()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Skein"))
        .stdout(predicate::str::contains("MCP servers"));
}

#[test]
fn test_version_displays() {
    skein()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("skein"));
}

#[test]
fn test_help_lists_subcommands() {
    skein()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("probe"));
}

#[test]
fn test_probe_help_shows_flags() {
    skein()
        .args(["probe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--newline"))
        .stdout(predicate::str::contains("--show-logs"))
        .stdout(predicate::str::contains("--config"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_call_requires_tool_name() {
    skein()
        .args(["call", "entry.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TOOL"));
}

#[test]
fn test_missing_entry_file() {
    skein()
        .args(["tools", "/nonexistent/skein-entry.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read entry file"));
}

#[test]
fn test_call_rejects_bad_args_json() {
    let dir = TempDir::new().unwrap();
    let entry = write_entry(&dir, r#"{"id": "s", "transport": "stdio", "config": {"command": "x"}}"#);
    skein()
        .arg("call")
        .arg(&entry)
        .args(["echo", "--args", "[1, 2]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--args must be a JSON object"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config and Transport Errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_config_names_server() {
    let dir = TempDir::new().unwrap();
    let entry = write_entry(&dir, r#"{"id": "srv-1", "transport": "stdio", "configJson": "{"}"#);
    skein()
        .arg("tools")
        .arg(&entry)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid MCP config"))
        .stderr(predicate::str::contains("srv-1"));
}

#[test]
fn test_config_override_file() {
    let dir = TempDir::new().unwrap();
    let entry = write_entry(&dir, r#"{"id": "remote", "transport": "http"}"#);
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"url": "ftp://example.com"}"#).unwrap();

    skein()
        .arg("tools")
        .arg(&entry)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("http or https"));
}

#[test]
fn test_probe_spawn_failure_json() {
    let dir = TempDir::new().unwrap();
    let entry = write_entry(
        &dir,
        r#"{"id": "ghost", "transport": "stdio", "config": {"command": "nonexistent-mcp-server-12345"}}"#,
    );
    skein()
        .arg("--json")
        .arg("probe")
        .arg(&entry)
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""status": "error""#))
        .stdout(predicate::str::contains("failed to spawn"));
}

#[test]
fn test_log_dir_receives_json_logs() {
    let dir = TempDir::new().unwrap();
    let logs = dir.path().join("logs");
    let entry = write_entry(
        &dir,
        r#"{"id": "ghost", "transport": "stdio", "config": {"command": "nonexistent-mcp-server-12345"}}"#,
    );
    skein()
        .arg("--log-dir")
        .arg(&logs)
        .arg("probe")
        .arg(&entry)
        .assert()
        .failure();

    let files: Vec<_> = std::fs::read_dir(&logs).unwrap().collect();
    assert!(!files.is_empty());
}
