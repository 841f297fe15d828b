//! CLI integration tests
//!
//! Tests the gmash CLI using assert_cmd.

use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;

fn gmash() -> Command {
    Command::cargo_bin("gmash")
        .expect("Failed to locate gmash binary - ensure it's built before running tests")
}

#[test]
fn test_cli_help() {
    gmash()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("gmash"))
        .stdout(predicate::str::contains("--local"))
        .stdout(predicate::str::contains("--agent"));
}

#[test]
fn test_cli_version() {
    gmash()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gmash"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();

    gmash()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[cfg(unix)]
#[test]
fn test_local_server_prints_connect_command() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
bind_address = "127.0.0.1:"
shell = "/bin/sh"
host_key_path = "{}"
password_length = 12
"#,
            dir.path().join("key").display()
        ),
    )
    .unwrap();

    gmash()
        .arg("--local")
        .arg("--config")
        .arg(&config_path)
        .timeout(Duration::from_secs(5))
        .assert()
        .interrupted()
        .stdout(predicate::str::contains(
            "ssh -o UserKnownHostsFile=/dev/null -p",
        ))
        .stdout(predicate::str::contains("127.0.0.1"))
        .stdout(predicate::str::is_match("password: [A-Za-z0-9]{12}").unwrap());

    assert!(dir.path().join("key").exists());
}
