use assert_cmd::cargo_bin;
use std::process::Command;
use std::time::{Duration, Instant};

mod common;

#[test]
fn test_large_roster_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let roster = dir.path().join("roster.csv");
    let ledger = dir.path().join("ledger.csv");
    common::generate_roster(&roster, &ledger, 2_000).expect("Failed to generate roster");

    let started = Instant::now();
    let output = Command::new(cargo_bin!("shiftpay"))
        .arg("simulate")
        .arg(&roster)
        .arg(&ledger)
        .arg("--date")
        .arg("2024-01-01")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "Binary failed to simulate 2000 workers");
    assert!(started.elapsed() < Duration::from_secs(120));

    let stdout = String::from_utf8_lossy(&output.stdout);
    // Header plus one payment per worker.
    assert_eq!(stdout.lines().count(), 2_001);
}
