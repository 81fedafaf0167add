#![cfg(feature = "cli")]

use assert_cmd::Command;
use bed_calib::io::{CalibrationConfig, CalibrationReport};
use bed_calib::solver::SolverParams;
use bed_calib::CalibrationResult;
use predicates::prelude::*;

fn bin() -> Command {
    Command::cargo_bin("bed-calib").expect("binary")
}

#[test]
fn init_config_writes_parseable_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cfg.json");

    bin()
        .args(["init-config", "--out"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote default config"));

    let cfg = CalibrationConfig::load_json(&path).expect("load");
    assert_eq!(cfg, CalibrationConfig::default());
}

#[test]
fn simulate_writes_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg_path = dir.path().join("cfg.json");
    let report_path = dir.path().join("report.json");
    let store_path = dir.path().join("record.bin");

    let mut cfg = CalibrationConfig::default();
    cfg.params.solver = SolverParams::unscaled();
    cfg.storage_path = Some(store_path.to_string_lossy().into_owned());
    cfg.write_json(&cfg_path).expect("write config");

    bin()
        .args(["--log-level", "warn", "simulate", "--config"])
        .arg(&cfg_path)
        .arg("--out")
        .arg(&report_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("refine: perfect"));

    let report = CalibrationReport::load_json(&report_path).expect("report");
    let refine = report.refine.expect("refine run");
    assert_eq!(refine.result, CalibrationResult::Perfect);
    assert_eq!(
        report.coarse.map(|r| r.result),
        Some(CalibrationResult::Perfect)
    );
    assert!(report.z_jitter.is_some());
    assert!(report.moves > 0);
    assert!(store_path.exists());
}

#[test]
fn simulate_scan_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg_path = dir.path().join("cfg.json");
    let report_path = dir.path().join("report.json");
    CalibrationConfig::default()
        .write_json(&cfg_path)
        .expect("write config");

    bin()
        .args(["simulate", "--scan", "--config"])
        .arg(&cfg_path)
        .arg("--out")
        .arg(&report_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("scan complete: true"));

    let report = CalibrationReport::load_json(&report_path).expect("report");
    assert!(report.coarse.is_none());
    assert_eq!(report.scan.map(|s| s.points.len()), Some(9));
}

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    bin()
        .args(["simulate", "--config"])
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
