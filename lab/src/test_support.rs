//! Scripted stand-ins for the external services, for tests.
//!
//! Each fake replays a queue of canned results in order and records every
//! request it receives. Running out of script is an error, so a test that
//! makes more calls than expected fails loudly.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{CompletionRequest, ExecutionResult, SourceFile, TestRun};
use crate::io::completion::Completer;
use crate::io::sandbox::CodeRunner;
use crate::io::test_runner::{TestRequest, TestRunner};
use crate::io::workspace::WorkingFiles;

/// A temporary directory holding one working file.
pub struct TempWorkspace {
    dir: TempDir,
    pub files: WorkingFiles,
}

impl TempWorkspace {
    pub fn new(filename: &str, code: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp workspace")?;
        let files = WorkingFiles::new(dir.path(), filename);
        files.write_source(code)?;
        Ok(Self { dir, files })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// A clean execution printing `stdout`.
pub fn clean_run(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// A failing execution reporting `stderr`.
pub fn failed_run(stderr: &str) -> ExecutionResult {
    ExecutionResult {
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// A finished test run with the given combined output and exit code.
pub fn test_run(output: &str, exit_code: i32) -> TestRun {
    TestRun {
        output: output.to_string(),
        exit_code: Some(exit_code),
        timed_out: false,
    }
}

/// A completion reply carrying a reasoning block and a code block.
pub fn fix_reply(reasoning: &str, code: &str) -> String {
    format!("```reasoning\n{reasoning}\n```\n\n```python\n{code}\n```")
}

struct Script<Req, Resp> {
    responses: Mutex<VecDeque<Resp>>,
    requests: Mutex<Vec<Req>>,
    name: &'static str,
}

impl<Req: Clone, Resp> Script<Req, Resp> {
    fn new(name: &'static str, responses: Vec<Resp>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            name,
        }
    }

    fn next(&self, request: &Req) -> Result<Resp> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("{} requests poisoned", self.name))?
            .push(request.clone());
        self.responses
            .lock()
            .map_err(|_| anyhow!("{} script poisoned", self.name))?
            .pop_front()
            .ok_or_else(|| anyhow!("{} script exhausted", self.name))
    }

    fn requests(&self) -> Vec<Req> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or_default()
    }
}

/// Sandbox fake returning queued execution results.
pub struct ScriptedRunner {
    script: Script<SourceFile, ExecutionResult>,
}

impl ScriptedRunner {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            script: Script::new("sandbox", results),
        }
    }

    /// Every file submitted, in order.
    pub fn submitted(&self) -> Vec<SourceFile> {
        self.script.requests()
    }

    pub fn remaining(&self) -> usize {
        self.script.remaining()
    }
}

impl CodeRunner for ScriptedRunner {
    fn run(&self, file: &SourceFile) -> Result<ExecutionResult> {
        self.script.next(file)
    }
}

/// Completion fake returning queued replies.
pub struct ScriptedCompleter {
    script: Script<CompletionRequest, String>,
}

impl ScriptedCompleter {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            script: Script::new("completion", replies),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.script.requests()
    }

    pub fn remaining(&self) -> usize {
        self.script.remaining()
    }
}

impl Completer for ScriptedCompleter {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.script.next(request)
    }
}

/// Test runner fake returning queued test runs.
pub struct ScriptedTestRunner {
    script: Script<TestRequest, TestRun>,
}

impl ScriptedTestRunner {
    pub fn new(runs: Vec<TestRun>) -> Self {
        Self {
            script: Script::new("tests", runs),
        }
    }

    pub fn requests(&self) -> Vec<TestRequest> {
        self.script.requests()
    }

    pub fn remaining(&self) -> usize {
        self.script.remaining()
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run(&self, request: &TestRequest) -> Result<TestRun> {
        self.script.next(request)
    }
}

/// A completer whose every call fails, for transport-error paths.
pub struct FailingCompleter;

impl Completer for FailingCompleter {
    fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Err(anyhow!("completion error 503 Service Unavailable"))
    }
}
