use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn ballotbox() -> Command {
    let mut cmd = Command::cargo_bin("ballotbox").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_zero_voters_is_a_configuration_error() {
    ballotbox()
        .args(["elect", "0", "--instant", "--no-report"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("Configuration error:"));
}

#[test]
fn test_negative_voters_is_a_configuration_error() {
    ballotbox()
        .args(["elect", "-3", "--instant", "--no-report"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error:"))
        .stderr(predicate::str::contains("-3"));
}

#[test]
fn test_too_many_voters_is_a_configuration_error() {
    ballotbox()
        .args(["elect", "90001", "--instant", "--no-report"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error:"));
}

#[test]
fn test_election_writes_report() {
    let dir = TempDir::new().unwrap();
    let report = dir.path().join("tally.txt");

    ballotbox()
        .args([
            "elect",
            "5",
            "--instant",
            "--seed",
            "7",
            "--validity-probability",
            "1.0",
            "--break-probability",
            "0",
        ])
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: 5"))
        .stdout(predicate::str::contains("The winner is party"));

    let content = std::fs::read_to_string(&report).unwrap();
    assert_eq!(content, "valid: 5\ninvalid: 0\n");
}

#[test]
fn test_election_logs_progress_to_stdout() {
    let output = ballotbox()
        .args(["elect", "3", "--instant", "--seed", "1", "--no-report"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    assert!(stdout.contains("validator is ready"), "{}", stdout);
    assert!(stdout.contains("tally has sent the statistics"), "{}", stdout);
}

#[test]
fn test_quiet_suppresses_progress() {
    let output = ballotbox()
        .args(["--quiet", "elect", "3", "--instant", "--no-report"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    assert!(!stdout.contains("validator is ready"));
    assert!(stdout.contains("Party"));
}

#[test]
fn test_missing_config_file_fails() {
    ballotbox()
        .args(["--config", "/nonexistent/ballotbox.toml", "elect", "3"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error:"));
}

#[test]
fn test_config_file_sets_parties() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("ballotbox.toml");
    std::fs::write(&config, "[election]\nparties = 2\nwrite_report = false\n").unwrap();

    let output = ballotbox()
        .arg("--config")
        .arg(&config)
        .args(["--quiet", "elect", "20", "--instant", "--seed", "4"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    assert!(!stdout.contains("Report written"), "{}", stdout);
    assert!(stdout.contains("The winner is party"), "{}", stdout);
}

#[test]
fn test_contest_runs() {
    ballotbox()
        .args([
            "--quiet",
            "contest",
            "--instant",
            "--seed",
            "3",
            "--entry",
            "Tapsi=Lovas",
            "--entry",
            "Füles=Szula",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tapsi"))
        .stdout(predicate::str::contains("The winner is"));
}

#[test]
fn test_contest_without_contestants_fails() {
    ballotbox()
        .args(["contest", "--instant"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error:"));
}
