//! Bounded repair loops.
//!
//! [`repair_loop`] drives a working file through run → diagnose → patch rounds
//! against the sandbox. [`test_repair_loop`] does the same against a local
//! test suite, patching the source under test with the test output as trace.
//! Both overwrite the working file in place and stop on the first success, a
//! missing fix, or the round limit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::agents::AgentContext;
use crate::agents::debugger::debug_patch;
use crate::core::repair::{self, LoopState, RepairOutcome, RunDecision, after_patch, after_run};
use crate::core::types::{Patch, RoundRecord, SourceFile, TestRoundRecord};
use crate::io::completion::Completer;
use crate::io::config::TestsConfig;
use crate::io::sandbox::CodeRunner;
use crate::io::test_runner::{TestRequest, TestRunner};
use crate::io::workspace::{WorkingFiles, read_text, write_text};

/// Result of a run/debug loop over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub outcome: RepairOutcome,
    pub rounds: Vec<RoundRecord>,
    /// Code of the clean run, when the loop succeeded.
    pub final_code: Option<String>,
}

impl RepairReport {
    /// Error output of the last run, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.rounds
            .last()
            .map(|record| record.execution.stderr.as_str())
            .filter(|stderr| !stderr.is_empty())
    }
}

/// Run `path` in the sandbox, asking the debug agent for a rewrite after every
/// failing run while `debug_enabled`.
///
/// Transport failures from either service abort with an error; a missing fix
/// or the round limit end the loop with the matching [`RepairOutcome`].
pub fn repair_loop<R, C, F>(
    runner: &R,
    completer: &C,
    ctx: &AgentContext<'_>,
    path: &Path,
    max_rounds: u32,
    debug_enabled: bool,
    mut on_round: F,
) -> Result<RepairReport>
where
    R: CodeRunner + ?Sized,
    C: Completer + ?Sized,
    F: FnMut(&RoundRecord),
{
    let name = file_name(path)?;
    let mut rounds = Vec::new();
    let mut final_code = None;
    let mut state = repair::INITIAL;

    let outcome = loop {
        let round = match state {
            LoopState::Running(round) => round,
            LoopState::Finished(outcome) => break outcome,
        };

        let code = read_text(path)?;
        let execution = runner.run(&SourceFile {
            name: name.clone(),
            content: code.clone(),
        })?;
        info!(
            round,
            file = %name,
            stderr_len = execution.stderr.len(),
            "run finished"
        );

        let mut record = RoundRecord {
            round,
            execution,
            patch: None,
        };
        state = match after_run(round, record.execution.is_clean(), debug_enabled) {
            RunDecision::Finish(outcome) => {
                if outcome.is_success() {
                    final_code = Some(code);
                }
                LoopState::Finished(outcome)
            }
            RunDecision::RequestPatch => {
                let patch = debug_patch(completer, ctx, &code, &record.execution.stderr)?;
                let patched = apply_patch(path, &patch)?;
                record.patch = Some(patch);
                after_patch(round, max_rounds, patched)
            }
        };
        on_round(&record);
        rounds.push(record);
    };

    info!(?outcome, file = %name, "repair loop finished");
    Ok(RepairReport {
        outcome,
        rounds,
        final_code,
    })
}

/// Result of a test/debug loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCycleReport {
    pub outcome: RepairOutcome,
    pub rounds: Vec<TestRoundRecord>,
    /// Source code the tests passed against.
    pub final_code: Option<String>,
}

/// Run the generated test file beside the working source and, while it fails,
/// patch the source using the test output as trace.
pub fn test_repair_loop<T, C, F>(
    test_runner: &T,
    completer: &C,
    ctx: &AgentContext<'_>,
    files: &WorkingFiles,
    tests: &TestsConfig,
    max_rounds: u32,
    mut on_round: F,
) -> Result<TestCycleReport>
where
    T: TestRunner + ?Sized,
    C: Completer + ?Sized,
    F: FnMut(&TestRoundRecord),
{
    let source_path = files.source_path.as_path();
    let request = TestRequest {
        workdir: files.dir.clone(),
        test_file: PathBuf::from(file_name(&files.test_path)?),
        timeout: Duration::from_secs(tests.timeout_secs),
        output_limit_bytes: tests.output_limit_bytes,
    };
    let mut rounds = Vec::new();
    let mut final_code = None;
    let mut state = repair::INITIAL;

    let outcome = loop {
        let round = match state {
            LoopState::Running(round) => round,
            LoopState::Finished(outcome) => break outcome,
        };

        let code = read_text(source_path)?;
        let run = test_runner.run(&request)?;
        let passed = tests.verdict.passed(&run, &tests.failure_marker);
        info!(round, passed, exit_code = ?run.exit_code, "tests finished");

        let mut record = TestRoundRecord {
            round,
            output: run.output,
            passed,
            patch: None,
        };
        state = match after_run(round, passed, true) {
            RunDecision::Finish(outcome) => {
                final_code = Some(code);
                LoopState::Finished(outcome)
            }
            RunDecision::RequestPatch => {
                let patch = debug_patch(completer, ctx, &code, &record.output)?;
                let patched = apply_patch(source_path, &patch)?;
                record.patch = Some(patch);
                after_patch(round, max_rounds, patched)
            }
        };
        on_round(&record);
        rounds.push(record);
    };

    info!(?outcome, "test loop finished");
    Ok(TestCycleReport {
        outcome,
        rounds,
        final_code,
    })
}

/// Overwrite `path` with the patch's code. Returns whether a fix was applied.
fn apply_patch(path: &Path, patch: &Patch) -> Result<bool> {
    match &patch.fixed_code {
        Some(fixed) => {
            write_text(path, fixed)?;
            Ok(true)
        }
        None => {
            warn!(path = %path.display(), "no fix returned; leaving source unchanged");
            Ok(false)
        }
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("invalid file path {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verdict::VerdictPolicy;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::{
        ScriptedCompleter, ScriptedRunner, ScriptedTestRunner, clean_run, failed_run, fix_reply,
        test_run,
    };
    use std::fs;

    fn working_file(dir: &Path, code: &str) -> PathBuf {
        let path = dir.join("user.py");
        fs::write(&path, code).expect("write source");
        path
    }

    #[test]
    fn clean_first_run_needs_no_agent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = working_file(temp.path(), "print(1)");
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let runner = ScriptedRunner::new(vec![clean_run("1")]);
        let completer = ScriptedCompleter::new(Vec::new());

        let report = repair_loop(&runner, &completer, &ctx, &path, 4, true, |_| {}).expect("loop");

        assert_eq!(report.outcome, RepairOutcome::Success { round: 1 });
        assert_eq!(report.final_code.as_deref(), Some("print(1)"));
        assert_eq!(runner.submitted()[0].name, "user.py");
        assert!(completer.requests().is_empty());
    }

    #[test]
    fn failing_run_without_debug_is_unrepaired() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = working_file(temp.path(), "print(1/0)");
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let runner = ScriptedRunner::new(vec![failed_run("ZeroDivisionError")]);
        let completer = ScriptedCompleter::new(Vec::new());

        let report =
            repair_loop(&runner, &completer, &ctx, &path, 4, false, |_| {}).expect("loop");

        assert_eq!(report.outcome, RepairOutcome::Unrepaired { round: 1 });
        assert_eq!(report.last_error(), Some("ZeroDivisionError"));
        assert_eq!(report.final_code, None);
    }

    #[test]
    fn patches_until_limit_then_exhausts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = working_file(temp.path(), "v0");
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let runner = ScriptedRunner::new(vec![failed_run("e1"), failed_run("e2")]);
        let completer =
            ScriptedCompleter::new(vec![fix_reply("one", "v1"), fix_reply("two", "v2")]);
        let mut seen = Vec::new();

        let report = repair_loop(&runner, &completer, &ctx, &path, 2, true, |record| {
            seen.push(record.round);
        })
        .expect("loop");

        assert_eq!(report.outcome, RepairOutcome::ExhaustedRetries { rounds: 2 });
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(runner.submitted()[1].content, "v1");
        // The last fix is written but never run.
        assert_eq!(fs::read_to_string(&path).expect("read"), "v2");
        assert_eq!(runner.remaining(), 0);
    }

    #[test]
    fn transport_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = working_file(temp.path(), "print(1/0)");
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let runner = ScriptedRunner::new(vec![failed_run("ZeroDivisionError")]);

        let err = repair_loop(
            &runner,
            &crate::test_support::FailingCompleter,
            &ctx,
            &path,
            4,
            true,
            |_| {},
        )
        .unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "print(1/0)");
    }

    #[test]
    fn test_loop_patches_source_with_test_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = working_file(temp.path(), "def add(a, b):\n    return a - b");
        let files = WorkingFiles::new(temp.path(), "user.py");
        fs::write(&files.test_path, "from user import add").expect("write tests");
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let fixed = "def add(a, b):\n    return a + b";
        let test_runner = ScriptedTestRunner::new(vec![
            test_run("FAILED test_user.py::test_add - assert -1 == 3", 1),
            test_run("1 passed in 0.01s", 0),
        ]);
        let completer = ScriptedCompleter::new(vec![fix_reply("subtracts", fixed)]);

        let report = test_repair_loop(
            &test_runner,
            &completer,
            &ctx,
            &files,
            &TestsConfig::default(),
            4,
            |_| {},
        )
        .expect("loop");

        assert_eq!(report.outcome, RepairOutcome::Success { round: 2 });
        assert!(!report.rounds[0].passed);
        assert!(report.rounds[1].passed);
        assert_eq!(report.final_code.as_deref(), Some(fixed));
        assert_eq!(fs::read_to_string(&path).expect("read"), fixed);
        assert!(completer.requests()[0].prompt().contains("assert -1 == 3"));

        let requests = test_runner.requests();
        assert_eq!(requests[0].workdir, temp.path());
        assert_eq!(requests[0].test_file, PathBuf::from("test_user.py"));
    }

    #[test]
    fn timed_out_tests_never_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = working_file(temp.path(), "while True: pass");
        let files = WorkingFiles::new(temp.path(), "user.py");
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let test_runner = ScriptedTestRunner::new(vec![crate::core::types::TestRun {
            output: "[timed out]".to_string(),
            exit_code: None,
            timed_out: true,
        }]);
        let completer = ScriptedCompleter::new(vec![fix_reply("loops forever", "pass")]);

        let report = test_repair_loop(
            &test_runner,
            &completer,
            &ctx,
            &files,
            &TestsConfig::default(),
            1,
            |_| {},
        )
        .expect("loop");

        assert_eq!(report.outcome, RepairOutcome::ExhaustedRetries { rounds: 1 });
        assert!(!report.rounds[0].passed);
        assert_eq!(report.final_code, None);
        assert_eq!(fs::read_to_string(&path).expect("read"), "pass");
    }

    #[test]
    fn exit_code_verdict_ignores_marker_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        working_file(temp.path(), "print('FAILED')");
        let files = WorkingFiles::new(temp.path(), "user.py");
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let test_runner =
            ScriptedTestRunner::new(vec![test_run("FAILED\n1 passed in 0.01s", 0)]);
        let completer = ScriptedCompleter::new(Vec::new());
        let config = TestsConfig {
            verdict: VerdictPolicy::ExitCode,
            ..TestsConfig::default()
        };

        let report = test_repair_loop(
            &test_runner,
            &completer,
            &ctx,
            &files,
            &config,
            4,
            |_| {},
        )
        .expect("loop");
        assert_eq!(report.outcome, RepairOutcome::Success { round: 1 });
    }
}
