#![allow(deprecated)]

/// End-to-end tests for the docuchat binary
///
/// Every test runs against `--offline`, so no backend is needed. Answers in
/// offline mode echo the question.
use assert_cmd::Command;
use predicates::prelude::*;
mod common;

const VALID_CONFIG: &str = "backend:\n  base_url: http://localhost:8000/api\n  timeout_seconds: 5\nlogging:\n  level: warn\n";

fn docuchat(config_path: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("docuchat").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("DOCUCHAT_BASE_URL")
        .env_remove("DOCUCHAT_TIMEOUT_SECONDS")
        .env_remove("DOCUCHAT_STREAMING")
        .env_remove("DOCUCHAT_PAGE_SIZE")
        .env_remove("DOCUCHAT_OWNER_ID")
        .arg("--config")
        .arg(config_path);
    cmd
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("docuchat").unwrap();
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("docuchat"));
}

#[test]
fn test_ask_offline_prints_echoed_answer() {
    let (_temp_dir, config_path) = common::temp_config_file(VALID_CONFIG);

    let mut cmd = docuchat(&config_path);
    cmd.arg("ask").arg("--offline").arg("hi");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("You asked: hi"));
}

#[test]
fn test_ask_offline_without_streaming() {
    let (_temp_dir, config_path) = common::temp_config_file(VALID_CONFIG);

    let mut cmd = docuchat(&config_path);
    cmd.arg("ask")
        .arg("--offline")
        .arg("--no-stream")
        .arg("Summarize chapter 1");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("You asked: Summarize chapter 1"));
}

#[test]
fn test_ask_unknown_conversation_fails() {
    let (_temp_dir, config_path) = common::temp_config_file(VALID_CONFIG);

    let mut cmd = docuchat(&config_path);
    cmd.arg("ask")
        .arg("--offline")
        .arg("--conversation")
        .arg("missing")
        .arg("hello");

    cmd.assert().failure();
}

#[test]
fn test_invalid_config_page_size_zero() {
    let (_temp_dir, config_path) = common::temp_config_file("chat:\n  page_size: 0\n");

    let mut cmd = docuchat(&config_path);
    cmd.arg("ask").arg("--offline").arg("hi");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_invalid_base_url_scheme() {
    let (_temp_dir, config_path) = common::temp_config_file(VALID_CONFIG);

    let mut cmd = docuchat(&config_path);
    cmd.arg("ask")
        .arg("--base-url")
        .arg("ftp://example.com")
        .arg("hi");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("http or https"));
}

#[test]
fn test_history_list_offline_is_empty() {
    let (_temp_dir, config_path) = common::temp_config_file(VALID_CONFIG);

    let mut cmd = docuchat(&config_path);
    cmd.arg("history").arg("list").arg("--offline");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No conversation history found."));
}

#[test]
fn test_history_delete_unknown_fails() {
    let (_temp_dir, config_path) = common::temp_config_file(VALID_CONFIG);

    let mut cmd = docuchat(&config_path);
    cmd.arg("history")
        .arg("delete")
        .arg("--offline")
        .arg("missing");

    cmd.assert().failure();
}

#[test]
fn test_unknown_subcommand_fails() {
    let mut cmd = Command::cargo_bin("docuchat").unwrap();
    cmd.arg("summon");

    cmd.assert().failure();
}
