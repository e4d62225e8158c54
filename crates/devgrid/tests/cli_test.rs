//! Integration tests for the `devgrid` CLI binary.
//!
//! Argument parsing, help output, and config handling run without a
//! backend; the device tests stand one up with wiremock.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `devgrid` binary with env isolation.
///
/// Clears all `DEVGRID_*` env vars and points config directories at
/// `home` so tests never touch the user's real configuration.
fn devgrid_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("devgrid");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("DEVGRID_PROFILE")
        .env_remove("DEVGRID_SERVER")
        .env_remove("DEVGRID_TOKEN")
        .env_remove("DEVGRID_OUTPUT")
        .env_remove("DEVGRID_INSECURE")
        .env_remove("DEVGRID_TIMEOUT")
        .env_remove("DEVGRID_DISPATCH_TIMEOUT")
        .env_remove("DEVGRID_BODY_ENCODING")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

async fn backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "type_name": "Light", "name": "Lamp", "state": "off", "commands": ["on", "off"] },
            { "id": 2, "type_name": "Light", "name": "Bulb", "state": "on" },
            { "id": 3, "type_name": "Switch", "name": "Fan", "state": "off", "commands": ["toggle"] }
        ])))
        .mount(&server)
        .await;
    server
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run_blocking(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = devgrid_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("device registry")
                .and(predicate::str::contains("devices"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("devgrid"));
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_invalid_subcommand() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .arg("teleport")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_devices_subcommands_exist() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .args(["devices", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list").and(predicate::str::contains("command")));
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_devices_list_without_backend_config() {
    let home = tempfile::tempdir().unwrap();
    let output = devgrid_cmd(home.path())
        .args(["devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("config init"), "Expected config hint:\n{text}");
}

#[test]
fn test_unknown_profile_is_not_found() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .args(["--profile", "attic", "devices", "list"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_config_path_points_into_config_dir() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_then_show() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .args(["config", "set", "server", "http://hub.local:8080"])
        .assert()
        .success();
    devgrid_cmd(home.path())
        .args(["config", "set", "dispatch_policy", "last-response-wins"])
        .assert()
        .success();

    devgrid_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[profiles.default]")
                .and(predicate::str::contains("http://hub.local:8080"))
                .and(predicate::str::contains("last-response-wins")),
        );
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .args(["config", "set", "colour", "blue"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Valid keys"));
}

#[test]
fn test_config_set_rejects_bad_server() {
    let home = tempfile::tempdir().unwrap();
    devgrid_cmd(home.path())
        .args(["config", "set", "server", "ftp://hub.local"])
        .assert()
        .failure()
        .code(2);
}

// ── Devices against a mock backend ──────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list_json_is_sorted() {
    let server = backend().await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = devgrid_cmd(home.path());
    cmd.args(["--server", &server.uri(), "-o", "json", "devices", "list"]);
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let devices: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = devices
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Bulb", "Lamp", "Fan"]);
    assert_eq!(devices[1]["id"], "1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list_table_groups_by_type() {
    let server = backend().await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = devgrid_cmd(home.path());
    cmd.args(["--server", &server.uri(), "--color", "never", "devices", "list"]);
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let text = String::from_utf8_lossy(&output.stdout);
    let light = text.find("Light").unwrap();
    let switch = text.find("Switch").unwrap();
    assert!(light < text.find("Bulb").unwrap());
    assert!(text.find("Lamp").unwrap() < switch);
    assert!(switch < text.find("Fan").unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_device_command_prints_new_state() {
    let server = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/device/1"))
        .and(body_json(json!({ "command": "on" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "state": "on" })))
        .expect(1)
        .mount(&server)
        .await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = devgrid_cmd(home.path());
    cmd.args(["--server", &server.uri(), "-o", "plain", "devices", "command", "1", "on"]);
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "on");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_device_command_unknown_command_lists_available() {
    let server = backend().await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = devgrid_cmd(home.path());
    cmd.args(["--server", &server.uri(), "devices", "command", "1", "explode"]);
    let output = run_blocking(cmd).await;

    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("on, off"), "Expected available commands:\n{text}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_device_command_unknown_device_is_not_found() {
    let server = backend().await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = devgrid_cmd(home.path());
    cmd.args(["--server", &server.uri(), "devices", "command", "99", "on"]);
    let output = run_blocking(cmd).await;

    assert_eq!(output.status.code(), Some(4));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_device_command_backend_error_fails() {
    let server = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/device/3"))
        .respond_with(ResponseTemplate::new(500).set_body_string("relay stuck"))
        .mount(&server)
        .await;
    let home = tempfile::tempdir().unwrap();

    let mut cmd = devgrid_cmd(home.path());
    cmd.args(["--server", &server.uri(), "devices", "command", "3", "toggle"]);
    let output = run_blocking(cmd).await;

    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(text.contains("HTTP 500"), "Expected status in error:\n{text}");
}
