//! CLI integration tests for fleet-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that do not need a database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the fleet-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("fleet-migrate").unwrap()
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

const VALID_TARGET: &str = "target:
  host: localhost
  database: fleet
  user: fleet
  password: secret
";

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--target-schema"))
        .stdout(predicate::str::contains("--batch-size"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fleet-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_listed() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--progress"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    // A missing file is an IO error, not a config error
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status"])
        .assert()
        .code(2);
}

#[test]
fn test_empty_config_exits_with_code_2() {
    let file = config_file("");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let file = config_file(&format!("source:\n  dump_dir: \"\"\n{}", VALID_TARGET));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("dump_dir"));
}

#[test]
fn test_invalid_ssl_mode_exits_with_code_2() {
    let file = config_file(&format!(
        "source:\n  dump_dir: /tmp\n{}  ssl_mode: sometimes\n",
        VALID_TARGET
    ));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ssl_mode"));
}

#[test]
fn test_missing_dump_dir_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no-such-dump");
    let file = config_file(&format!(
        "source:\n  dump_dir: {}\n{}",
        missing.display(),
        VALID_TARGET
    ));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validate row counts"));
}

#[test]
fn test_status_command_exists() {
    cmd()
        .args(["status", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("per-table migration state"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
