// End-to-end tests for the stopwatch binary

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn stopwatch() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("stopwatch");
    // Keep the environment from leaking a counter selection into the run
    cmd.env_remove("STOPWATCH_EVENTS");
    cmd
}

#[test]
fn test_text_report() {
    stopwatch()
        .args(["--size", "8", "--iterations", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TOTAL REAL MICROSECONDS"))
        .stdout(predicate::str::contains("SW_USER_USEC"))
        .stdout(predicate::str::contains("| total-loop"))
        .stdout(predicate::str::contains("|     row-major"))
        .stdout(predicate::str::contains("|     column-major"))
        .stdout(predicate::str::contains("|     clear"));
}

#[test]
fn test_csv_report() {
    stopwatch()
        .args(["-n", "4", "-i", "3", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "ID,NAME,CALLER_ID,TIMES_CALLED,TOTAL_REAL_MICROSECONDS,SW_USER_USEC,SW_SYS_USEC\n",
        ))
        .stdout(predicate::str::contains("\n1,total-loop,0,1,"))
        .stdout(predicate::str::contains("\n2,row-major,1,3,"))
        .stdout(predicate::str::contains("\n4,clear,1,6,"));
}

#[test]
fn test_json_report() {
    let output = stopwatch()
        .args(["-n", "4", "-i", "1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["routines"][0]["name"], "total-loop");
    assert_eq!(value["routines"][0]["depth"], 0);
    assert_eq!(value["routines"].as_array().unwrap().len(), 4);
}

#[test]
fn test_events_flag() {
    stopwatch()
        .args(["-n", "4", "-i", "1", "-e", "SW_MINOR_FAULTS,SW_VOL_CTX"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SW_MINOR_FAULTS"))
        .stdout(predicate::str::contains("SW_VOL_CTX"))
        .stdout(predicate::str::contains("SW_USER_USEC").not());
}

#[test]
fn test_events_from_environment() {
    stopwatch()
        .env("STOPWATCH_EVENTS", "SW_MAJOR_FAULTS")
        .args(["-n", "4", "-i", "1", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "TOTAL_REAL_MICROSECONDS,SW_MAJOR_FAULTS\n",
        ));
}

#[test]
fn test_hardware_counter_rejected() {
    stopwatch()
        .args(["-n", "4", "-e", "PAPI_TOT_CYC"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PAPI_TOT_CYC"));
}

#[test]
fn test_too_many_events_rejected() {
    let list = vec!["SW_USER_USEC"; 11].join(",");
    stopwatch()
        .args(["-n", "4", "-e", &list])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Too many counters"));
}

#[test]
fn test_zero_size_rejected() {
    stopwatch()
        .args(["--size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--size"));
}

#[test]
fn test_csv_file_export() {
    let tmp_dir = TempDir::new().unwrap();
    let csv_path = tmp_dir.path().join("out.csv");

    stopwatch()
        .args(["-n", "4", "-i", "2", "--csv"])
        .arg(&csv_path)
        .assert()
        .success();

    let content = fs::read_to_string(&csv_path).unwrap();
    assert!(content.starts_with("ID,NAME,CALLER_ID"));
    assert_eq!(content.lines().count(), 5);
    assert!(content.contains("\n3,column-major,1,2,"));
}

#[test]
fn test_config_file() {
    let tmp_dir = TempDir::new().unwrap();
    let config_path = tmp_dir.path().join("stopwatch.toml");
    fs::write(
        &config_path,
        "events = [\"SW_INVOL_CTX\"]\nindent_spacing = 2\n",
    )
    .unwrap();

    stopwatch()
        .args(["-n", "4", "-i", "1", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("SW_INVOL_CTX"))
        .stdout(predicate::str::contains("|   row-major"));
}

#[test]
fn test_invalid_format() {
    stopwatch()
        .args(["--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
