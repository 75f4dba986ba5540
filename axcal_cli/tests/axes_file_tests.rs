//! Axes file robustness tests for axcal.
//!
//! These tests verify the CLI refuses to guess when:
//! - The axes file is missing or is not valid JSON
//! - A description carries a truncated calibration block
//! - The config file is invalid

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cli(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("axcal"));
    cmd.env("XDG_CONFIG_HOME", dir).env_remove("RUST_LOG");
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_missing_axes_file() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("show")
        .arg(temp_dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_corrupted_axes_file() {
    let temp_dir = setup_test_dir();
    let path = temp_dir.path().join("axes.json");
    fs::write(&path, "[{ invalid json }}}}").unwrap();

    cli(temp_dir.path())
        .arg("calibrate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON error"));

    // the broken file is left as it was
    assert_eq!(fs::read_to_string(&path).unwrap(), "[{ invalid json }}}}");
}

#[test]
fn test_truncated_calibration_block() {
    let temp_dir = setup_test_dir();
    let path = temp_dir.path().join("axes.json");
    fs::write(
        &path,
        r#"[{"key": "t", "type_flags": 8, "description": "<axis_calibration><units>s</units>"}]"#,
    )
    .unwrap();

    cli(temp_dir.path())
        .arg("show")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed calibration encoding"));
}

#[test]
fn test_unknown_unit_is_reported_not_fatal() {
    let temp_dir = setup_test_dir();
    let path = temp_dir.path().join("axes.json");
    fs::write(
        &path,
        r#"[{"key": "x", "type_flags": 2, "description": "<axis_calibration><units>furlong</units></axis_calibration>"}]"#,
    )
    .unwrap();

    cli(temp_dir.path())
        .arg("show")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("origin: 0 pixel"))
        .stderr(predicate::str::contains("furlong"));
}

#[test]
fn test_invalid_config_file() {
    let temp_dir = setup_test_dir();
    let config = temp_dir.path().join("config.toml");
    fs::write(&config, "[comparison]\natol = -1\n").unwrap();

    cli(temp_dir.path())
        .arg("--config")
        .arg(&config)
        .args(["decode", "plain text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_default_config_location_is_used() {
    let temp_dir = setup_test_dir();
    let config_dir = temp_dir.path().join("axcal");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[output]\npretty_json = false\n").unwrap();

    cli(temp_dir.path())
        .args(["decode", "plain text"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{\"axis_key\":\"?\""));
}

#[test]
fn test_deeply_nested_block_is_malformed() {
    let temp_dir = setup_test_dir();
    let path = temp_dir.path().join("axes.json");
    let depth = 100_000;
    let description = format!(
        "<axis_calibration>{}{}</axis_calibration>",
        "<a>".repeat(depth),
        "</a>".repeat(depth)
    );
    let axes = serde_json::json!([{"key": "t", "type_flags": 8, "description": description}]);
    fs::write(&path, axes.to_string()).unwrap();

    cli(temp_dir.path())
        .arg("show")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Malformed calibration encoding"));
}

#[test]
fn test_repeated_unknown_keys_rejected() {
    let temp_dir = setup_test_dir();
    let path = temp_dir.path().join("axes.json");
    let contents = r#"[{"key": "?", "type_flags": 64, "description": ""}, {"key": "?", "type_flags": 64, "description": ""}]"#;
    fs::write(&path, contents).unwrap();

    cli(temp_dir.path())
        .arg("calibrate")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(&path).unwrap(), contents);
}

#[test]
fn test_unclosed_name_marker_stays_in_description() {
    let temp_dir = setup_test_dir();
    let path = temp_dir.path().join("axes.json");
    fs::write(
        &path,
        r#"[{"key": "t", "type_flags": 8, "description": "fill in <name> later"}]"#,
    )
    .unwrap();

    cli(temp_dir.path())
        .arg("calibrate")
        .arg(&path)
        .assert()
        .success();

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let description = saved[0]["description"].as_str().unwrap();
    assert!(description.starts_with("fill in <name> later <axis_calibration>"));
}
