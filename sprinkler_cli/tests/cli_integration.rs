use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid TOML config; the sim backend ignores the pins but they must be present.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
nozzle_pwm_channel = 0
nozzle_dir = 17
valve_pwm_channel = 1
valve_dir = 6

[pressure]
trend_window = 8

[valve]
# keep sim runs short
open_timeout_ms = 300
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], &[], 0, "Usage:", "stdout")]
#[case(&["status"], &[], 0, "angle:", "stdout")]
#[case(&["rotate", "--to", "100"], &[], 0, "rotate: success", "stdout")]
#[case(&["rotate-by", "--by", "-50"], &[("SPRINKLER_SIM_ANGLE", "20")], 0, "rotate-by: success", "stdout")]
#[case(&["rotate"], &[], 2, "required", "stderr")]
#[case(&["rotate", "--to", "5000"], &[], 2, "invalid value", "stderr")]
#[case(&["pressure", "--target=-50"], &[], 7, "ambient", "stderr")]
#[case(&["open-valve"], &[], 0, "open-valve: success", "stdout")]
#[case(&["open-valve"], &[("SPRINKLER_SIM_NO_SUPPLY", "1")], 5, "No water pressure appeared", "stderr")]
#[case(&["close-valve"], &[], 0, "no-water-pressure", "stdout")]
#[case(&["self-check"], &[("SPRINKLER_SIM_SENSOR_FAULT", "1")], 4, "sensor", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] env: &[(&str, &str)],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--config").arg(&cfg).arg("--log-level").arg("error");
    for (k, v) in env {
        cmd.env(k, v);
    }
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn hold_stops_after_deadline() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("error")
        .args(["hold", "--psi", "2", "--seconds", "1"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hold: success"));
}

#[rstest]
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let bad_csv = dir.path().join("calib.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "curve,distance,us").unwrap();
    writeln!(f, "nozzle_right,10,4000").unwrap();

    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&bad_csv)
        .arg("self-check");

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn status_shows_loaded_calibration() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let csv = dir.path().join("calib.csv");
    fs::write(
        &csv,
        "curve,x,y\nnozzle_right,10,4000\nnozzle_left,10,4200\nvalve,0,0\nvalve,300,90\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .arg("status");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("nozzle=true valve=true"));
}

#[rstest]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("status");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("config file could not be read"));
}

#[rstest]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(
        &path,
        "[pins]\nnozzle_pwm_channel = 0\nnozzle_dir = 17\nvalve_pwm_channel = 0\nvalve_dir = 6\n",
    )
    .unwrap();
    let mut cmd = Command::cargo_bin("sprinkler").unwrap();
    cmd.arg("--config").arg(&path).arg("status");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("must differ"));
}
