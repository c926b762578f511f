//! CLI contract: `simulate` emits a JSON result and a timeline CSV; bad
//! inputs exit non-zero.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

const FIXTURE: &str = "\
ts,open,high,low,close,volume
2024-01-02T15:00:00Z,100,100,100,100,1000
2024-01-02T16:00:00Z,95,95,95,95,1000
2024-01-02T17:00:00Z,99,99,99,99,1000
";

fn write_fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("bars.csv");
    fs::write(&path, FIXTURE).unwrap();
    path
}

#[test]
fn simulate_emits_json_and_timeline_csv() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write_fixture(&dir);
    let timeline = dir.path().join("timeline.csv");

    Command::cargo_bin("vbl")
        .unwrap()
        .args([
            "simulate",
            "--ticker", "AAPL",
            "--from", "2024-01-02",
            "--to", "2024-01-02",
            "--cash", "10000",
            "--interval", "60",
            "--bars", bars.to_str().unwrap(),
            "--timeline-csv", timeline.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ticker\": \"AAPL\""))
        .stdout(predicate::str::contains("\"metrics\""))
        .stdout(predicate::str::contains("\"bar_count\": 3"));

    let csv = fs::read_to_string(&timeline).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("timestamp,mode,action"));
    assert_eq!(lines.count(), 3, "one row per bar");
}

#[test]
fn simulate_is_deterministic_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write_fixture(&dir);

    let run = || {
        let output = Command::cargo_bin("vbl")
            .unwrap()
            .args([
                "simulate",
                "--ticker", "AAPL",
                "--from", "2024-01-02",
                "--to", "2024-01-02",
                "--cash", "10000",
                "--interval", "60",
                "--bars", bars.to_str().unwrap(),
            ])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    };

    assert_eq!(run(), run());
}

#[test]
fn missing_bars_file_exits_nonzero() {
    Command::cargo_bin("vbl")
        .unwrap()
        .args([
            "simulate",
            "--ticker", "AAPL",
            "--from", "2024-01-02",
            "--to", "2024-01-02",
            "--cash", "10000",
            "--bars", "/nonexistent/bars.csv",
        ])
        .assert()
        .failure();
}

#[test]
fn bad_date_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write_fixture(&dir);
    Command::cargo_bin("vbl")
        .unwrap()
        .args([
            "simulate",
            "--ticker", "AAPL",
            "--from", "02-01-2024",
            "--to", "2024-01-02",
            "--cash", "10000",
            "--bars", bars.to_str().unwrap(),
        ])
        .assert()
        .failure();
}
