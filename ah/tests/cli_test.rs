//! Binary smoke tests; no primary is running on the configured port

mod common;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::free_port;

/// askhuman isolated from the user's config, data and log directories
fn askhuman(temp: &Path) -> Command {
    let mut cmd = Command::cargo_bin("askhuman").expect("binary built");
    cmd.current_dir(temp)
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join("config"))
        .env("XDG_DATA_HOME", temp.join("data"))
        .env_remove("RUST_LOG");
    cmd
}

/// Config file pointing at an unused port
fn write_config(temp: &Path) -> std::path::PathBuf {
    write_config_at(&temp.join("askhuman.yml"), temp, free_port())
}

fn write_config_at(path: &Path, temp: &Path, port: u16) -> std::path::PathBuf {
    let yaml = format!(
        "server:\n  port: {}\n  probe-timeout-ms: 300\nstorage:\n  db-path: {}\nbrowser:\n  open-on-first-ask: false\n",
        port,
        temp.join("app.db").display()
    );
    std::fs::write(path, yaml).unwrap();
    path.to_path_buf()
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    askhuman(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mcp"))
        .stdout(predicate::str::contains("respond"))
        .stdout(predicate::str::contains("Logs are written to"));
}

#[test]
fn test_help_reports_configured_port() {
    let temp = TempDir::new().unwrap();
    let port = free_port();
    write_config_at(&temp.path().join(".askhuman.yml"), temp.path(), port);
    askhuman(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("(port {})", port)));

    let explicit_port = free_port();
    let config = write_config_at(&temp.path().join("other.yml"), temp.path(), explicit_port);
    askhuman(temp.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("(port {})", explicit_port)));
}

#[test]
fn test_version() {
    let temp = TempDir::new().unwrap();
    askhuman(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_list_rejects_unknown_format() {
    let temp = TempDir::new().unwrap();
    askhuman(temp.path())
        .args(["list", "--format", "table"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

#[test]
fn test_ask_requires_source() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    askhuman(temp.path())
        .arg("--config")
        .arg(&config)
        .args(["ask", "--app", "app1", "pick a color"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--source"));
}

#[test]
fn test_status_without_primary() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    askhuman(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("no primary running"))
        .stdout(predicate::str::contains("app.db"));
}

#[test]
fn test_respond_without_primary_fails() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    askhuman(temp.path())
        .arg("--config")
        .arg(&config)
        .args(["respond", "1", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No askhuman primary"));
}
