use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
nozzle_pwm_channel = 0
nozzle_dir = 17
valve_pwm_channel = 1
valve_dir = 6

[valve]
open_timeout_ms = 300
close_on_exit = false
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

/// Validate the JSONL schema for a successful operation.
#[rstest]
fn jsonl_success_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("open-valve");

    let out = cmd.assert().success().get_output().stdout.clone();
    let lines = json_lines(&out);
    let v = lines
        .iter()
        .find(|v| v.get("op").is_some())
        .unwrap_or_else(|| panic!("no result line; got {lines:?}"));

    assert_eq!(v["op"], "open-valve");
    assert_eq!(v["status"], "success");
    assert!(v.get("timestamp").and_then(|x| x.as_i64()).is_some());
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("angle").and_then(|x| x.as_i64()).is_some());
    assert!(v["pressure"].as_i64().unwrap() > 0);
    assert!(v["psi"].as_f64().unwrap() > 0.0);
}

/// A failed operation still reports its result line, followed by the error.
#[rstest]
fn jsonl_failure_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("open-valve")
        .env("SPRINKLER_SIM_NO_SUPPLY", "1");

    let out = cmd.assert().code(5).get_output().stdout.clone();
    let lines = json_lines(&out);
    assert_eq!(lines.len(), 2, "stdout lines: {lines:?}");

    assert_eq!(lines[0]["op"], "open-valve");
    assert_eq!(lines[0]["status"], "timeout");

    assert_eq!(lines[1]["reason"], "timeout");
    assert!(
        lines[1]["message"]
            .as_str()
            .unwrap()
            .starts_with("What happened")
    );
}

#[rstest]
fn jsonl_status_fields() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("status")
        .env("SPRINKLER_SIM_ANGLE", "1234");

    let out = cmd.assert().success().get_output().stdout.clone();
    let lines = json_lines(&out);
    let v = &lines[0];
    assert_eq!(v["angle"], 1234);
    assert_eq!(v["water"], false);
    assert_eq!(v["nozzle_calibrated"], false);
    for key in ["pressure", "psi", "ambient", "close_tight_ms"] {
        assert!(v[key].is_number(), "{key} should be a number");
    }
}
