//! Integration tests: harness CLI
//!
//! Validates:
//! 1. `run` passes for both engines and writes a schema-valid JSONL log.
//! 2. `run` exits non-zero when scenarios fail.
//! 3. `stress` prints a passing summary line.

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use arenalloc_harness::structured_log::{Outcome, validate_log_file, validate_log_line};

fn unique_tmp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn harness() -> Command {
    Command::new(env!("CARGO_BIN_EXE_harness"))
}

#[test]
fn run_passes_for_both_engines_and_logs_valid_jsonl() {
    let dir = unique_tmp_dir("arenalloc-run");
    for engine in ["free-list", "slab"] {
        let log = dir.join(format!("{engine}.jsonl"));
        let output = harness()
            .args(["run", "--engine", engine, "--log"])
            .arg(&log)
            .output()
            .expect("spawn harness");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(output.status.success(), "{engine}: {stderr}");
        assert!(stderr.contains(&format!("[PASS] {engine}/basic_alloc_free")));
        assert!(!stderr.contains("[FAIL]"));

        let (lines, errors) = validate_log_file(&log).expect("read log");
        assert!(lines > 0);
        assert!(errors.is_empty(), "{engine}: {errors:?}");
    }
}

#[test]
fn run_fails_when_region_is_too_small() {
    let output = harness()
        .args(["run", "--engine", "slab", "--region-size", "1000"])
        .output()
        .expect("spawn harness");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[FAIL] slab/basic_alloc_free"));
    assert!(stderr.contains("ScenariosFailed"));

    // Without --log, entries go to stdout.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ends: Vec<_> = stdout
        .lines()
        .enumerate()
        .map(|(i, l)| validate_log_line(l, i + 1).expect("valid line"))
        .filter(|e| e.event == "scenario_end")
        .collect();
    assert!(ends.iter().any(|e| e.outcome == Some(Outcome::Fail)));
}

#[test]
fn stress_reports_clean_summary() {
    let output = harness()
        .args(["stress", "--engine", "slab", "--threads", "3", "--iterations", "300"])
        .output()
        .expect("spawn harness");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let summary = validate_log_line(stdout.trim(), 1).expect("summary line");
    assert_eq!(summary.event, "stress_summary");
    assert_eq!(summary.outcome, Some(Outcome::Pass));
    let details = summary.details.expect("details");
    assert_eq!(details["corrupted"], 0);
    assert_eq!(details["threads"], 3);
}

#[test]
fn unknown_engine_is_a_usage_error() {
    let output = harness()
        .args(["run", "--engine", "buddy"])
        .output()
        .expect("spawn harness");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("buddy"));
}
