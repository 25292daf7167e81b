//! CLI tests for `codelab` commands that need no external services.
//!
//! Spawns the binary and checks exit codes and files written.

use std::fs;
use std::process::Command;

use codelab::exit_codes;
use codelab::io::config::{LabConfig, load_config};

#[test]
fn run_missing_file_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(env!("CARGO_BIN_EXE_codelab"))
        .current_dir(temp.path())
        .args(["run", "missing.py"])
        .output()
        .expect("codelab run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.py"), "stderr: {stderr}");
}

#[test]
fn run_with_invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("app.py"), "print(1)").expect("write source");
    fs::write(temp.path().join("codelab.toml"), "max_rounds = 0\n").expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_codelab"))
        .current_dir(temp.path())
        .args(["run", "app.py"])
        .status()
        .expect("codelab run");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert_eq!(
        fs::read_to_string(temp.path().join("app.py")).expect("read"),
        "print(1)"
    );
}

#[test]
fn init_config_writes_loadable_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_codelab"))
        .current_dir(temp.path())
        .arg("init-config")
        .status()
        .expect("codelab init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let config = load_config(&temp.path().join("codelab.toml")).expect("load");
    assert_eq!(config, LabConfig::default());

    let again = Command::new(env!("CARGO_BIN_EXE_codelab"))
        .current_dir(temp.path())
        .arg("init-config")
        .status()
        .expect("codelab init-config");
    assert_eq!(again.code(), Some(exit_codes::INVALID));
}
