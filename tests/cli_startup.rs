use std::process::{Command, Stdio};

use fearcast::app_dirs::CONFIG_HOME_ENV;
use tempfile::tempdir;

#[test]
fn missing_dataset_is_fatal_and_reported_once() {
    let home = tempdir().unwrap();
    let dataset = home.path().join("missing.csv");
    let output = Command::new(env!("CARGO_BIN_EXE_fearcast"))
        .arg("--dataset")
        .arg(&dataset)
        .env(CONFIG_HOME_ENV, home.path())
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let error_lines = stdout.lines().filter(|line| line.contains("ERROR")).count();
    assert_eq!(error_lines, 1, "stdout:\n{stdout}");
    assert_eq!(stderr.lines().filter(|line| !line.trim().is_empty()).count(), 1);
    assert!(stderr.contains("missing.csv"), "stderr:\n{stderr}");
}

#[test]
fn unknown_argument_exits_with_usage() {
    let home = tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_fearcast"))
        .arg("--bogus")
        .env(CONFIG_HOME_ENV, home.path())
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown argument: --bogus"));
    assert!(stderr.contains("Usage:"));
}
