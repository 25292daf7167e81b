//! Local test runner adapter (pytest by default).

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::types::TestRun;
use crate::io::config::TestsConfig;
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Clone)]
pub struct TestRequest {
    /// Directory the tests run in; the module under test must be importable from here.
    pub workdir: PathBuf,
    pub test_file: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait TestRunner {
    /// Run the test file. A failing test suite is not an error; failing to spawn is.
    fn run(&self, request: &TestRequest) -> Result<TestRun>;
}

/// Runs a configured command with the test file appended.
pub struct CommandTestRunner {
    command: Vec<String>,
}

impl CommandTestRunner {
    pub fn new(config: &TestsConfig) -> Self {
        Self {
            command: config.command.clone(),
        }
    }
}

impl TestRunner for CommandTestRunner {
    #[instrument(skip_all, fields(test_file = %request.test_file.display()))]
    fn run(&self, request: &TestRequest) -> Result<TestRun> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("test command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(&request.test_file)
            .current_dir(&request.workdir);

        info!(program = %program, "running tests");
        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {program}"))?;
        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "tests timed out");
        }

        Ok(TestRun {
            output: output.combined_text().trim().to_string(),
            exit_code: output.status.code(),
            timed_out: output.timed_out,
        })
    }
}
