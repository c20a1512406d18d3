//! CLI argument and configuration tests, no network I/O.
//!
//! These tests verify that bad arguments and bad configuration are rejected
//! before any upload is attempted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn cmd() -> Command {
    assert_cmd::cargo::cargo_bin_cmd!("imgrelay")
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_fixtures")
}

/// A command isolated from the user's config and data.
fn isolated(name: &str) -> (Command, PathBuf) {
    let dir = std::env::temp_dir().join(format!("imgrelay_cli_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let mut command = cmd();
    command
        .env("IMGRELAY_CONFIG", dir.join("config.toml"))
        .env("IMGRELAY_DATA_DIR", dir.join("data"))
        .env("IMGRELAY_REPLAY", fixtures_dir().join("channels.cassette.yaml"))
        .env_remove("IMGRELAY_REC")
        .env_remove("MIYOUSHE_COOKIE");
    (command, dir)
}

#[test]
fn missing_subcommand_exits_with_error() {
    cmd().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn upload_requires_a_file_argument() {
    cmd().arg("upload").assert().failure().stderr(predicate::str::contains("<FILE>"));
}

#[test]
fn channels_lists_builtins_and_marks_default() {
    let (mut command, dir) = isolated("channels");
    command
        .arg("channels")
        .assert()
        .success()
        .stdout(predicate::str::contains("chatglm (default)"))
        .stdout(predicate::str::contains("jd"))
        .stdout(predicate::str::contains("miyoushe"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn configured_default_channel_is_marked() {
    let (mut command, dir) = isolated("default_jd");
    std::fs::write(dir.join("config.toml"), "[upload]\ndefault_channel = \"jd\"\n").unwrap();
    command.arg("channels").assert().success().stdout(predicate::str::contains("jd (default)"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unknown_default_channel_is_a_config_error() {
    let (mut command, dir) = isolated("bad_default");
    std::fs::write(dir.join("config.toml"), "[upload]\ndefault_channel = \"imgur\"\n").unwrap();
    command
        .arg("channels")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"))
        .stderr(predicate::str::contains("imgur"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn malformed_config_is_reported() {
    let (mut command, dir) = isolated("bad_toml");
    std::fs::write(dir.join("config.toml"), "[upload\n").unwrap();
    command
        .arg("channels")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn explicit_config_flag_wins_over_env() {
    let (mut command, dir) = isolated("flag_wins");
    let flagged = dir.join("flagged.toml");
    std::fs::write(&flagged, "[upload]\ndefault_channel = \"miyoushe\"\n").unwrap();
    command
        .args(["channels", "--config", flagged.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("miyoushe (default)"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_file_is_an_io_error() {
    let (mut command, dir) = isolated("missing_file");
    command
        .args(["upload", "/nonexistent/cat.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("I/O error"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_cassette_is_a_config_error() {
    let (mut command, dir) = isolated("missing_cassette");
    command
        .env("IMGRELAY_REPLAY", "/nonexistent/channels.cassette.yaml")
        .arg("channels")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load cassette"));
    let _ = std::fs::remove_dir_all(&dir);
}
