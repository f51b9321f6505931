//! Binary-level tests for argument handling and configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn harvester(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fsa-harvester"));
    // Isolate from the developer's environment and any .env file
    cmd.env_clear().current_dir(dir.path());
    cmd
}

#[test]
fn test_help_lists_both_registers() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("certificates"))
        .stdout(predicate::str::contains("declarations"));
}

#[test]
fn test_missing_token_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .arg("certificates")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("BEARER_TOKEN not set"));
}

#[test]
fn test_inverted_window_is_rejected() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args([
            "declarations",
            "--min-end-date",
            "2024-01-01",
            "--max-end-date",
            "2023-01-01",
            "--tech-reg",
            "017",
        ])
        .env("BEARER_TOKEN", "Bearer x")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_unparseable_date_is_reported() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["certificates", "--min-end-date", "someday"])
        .env("BEARER_TOKEN", "Bearer x")
        .env("IDS_TECH_REG", "017")
        .env("MAX_END_DATE", "20231231")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date 'someday'"));
}

#[test]
fn test_unknown_subcommand() {
    let dir = TempDir::new().unwrap();
    harvester(&dir).arg("licenses").assert().failure();
}
