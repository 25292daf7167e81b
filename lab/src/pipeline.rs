//! Single-shot analysis: forecast, repair, clean and test one working file.
//!
//! Stage order is fixed. Forecast runs first and on its own. When the
//! run/debug stage is selected, the critic and test stages only run if it
//! ended in success; otherwise they are reported as skipped.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::agents::AgentContext;
use crate::agents::critic::critic_review;
use crate::agents::forecast::forecast_failures;
use crate::agents::test_writer::generate_unit_tests;
use crate::core::naming::{is_valid_filename, truncate_chars};
use crate::core::repair::RepairOutcome;
use crate::core::types::{AgentSelection, Critique, RoundRecord, TestRoundRecord};
use crate::io::completion::Completer;
use crate::io::config::LabConfig;
use crate::io::prompt::PromptEngine;
use crate::io::sandbox::CodeRunner;
use crate::io::test_runner::TestRunner;
use crate::io::workspace::{WorkingFiles, create_session, write_json, write_text};
use crate::looping::{repair_loop, test_repair_loop};

/// Characters of critic stderr kept in the report.
pub const CRITIC_ERROR_LIMIT: usize = 500;
/// Note reported when the test writer returns no code.
pub const TEST_GENERATION_FAILED: &str = "Test generation failed.";
const SKIPPED_AFTER_FAILED_RUN: &str = "skipped: code did not run cleanly";

fn default_filename() -> String {
    "user.py".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRequest {
    pub code: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

/// Body of an analyze request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub code_request: CodeRequest,
    #[serde(default)]
    pub agents: AgentSelection,
}

/// The request cannot be served as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRequestError {
    pub reason: String,
}

impl fmt::Display for InvalidRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request: {}", self.reason)
    }
}

impl std::error::Error for InvalidRequestError {}

fn invalid(reason: impl Into<String>) -> anyhow::Error {
    InvalidRequestError {
        reason: reason.into(),
    }
    .into()
}

/// Reject requests that cannot be written to a session directory.
pub fn validate_request(request: &AnalyzeRequest) -> Result<()> {
    let code = &request.code_request;
    if !is_valid_filename(&code.filename) {
        return Err(invalid(format!(
            "filename {:?} must be a plain file name of letters, digits, '_' or '-'",
            code.filename
        )));
    }
    if code.code.trim().is_empty() {
        return Err(invalid("code must be non-empty"));
    }
    Ok(())
}

/// What one analysis does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisPlan {
    pub agents: AgentSelection,
    pub user_prompt: Option<String>,
    pub session_id: Option<String>,
}

/// The three external services an analysis talks to.
pub struct Services<'a, R: ?Sized, C: ?Sized, T: ?Sized> {
    pub runner: &'a R,
    pub completer: &'a C,
    pub test_runner: &'a T,
}

/// Outcome and history of a run/debug loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairStage {
    pub outcome: RepairOutcome,
    pub rounds: Vec<RoundRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub reasoning: Option<String>,
    pub improved_code: Option<String>,
    pub critic_file: Option<String>,
    pub cleaned_file: Option<String>,
    pub error_in_critic: Option<String>,
    pub validation: Option<RepairStage>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestsReport {
    pub test_file: Option<String>,
    pub test_code: Option<String>,
    pub rounds: Vec<TestRoundRecord>,
    pub outcome: Option<RepairOutcome>,
    pub note: Option<String>,
}

/// Everything an analysis produced. Also persisted as the report file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub session_id: Option<String>,
    pub filename: String,
    pub forecast: Option<String>,
    pub repair: Option<RepairStage>,
    pub clean: Option<CleanReport>,
    pub tests: Option<TestsReport>,
    pub final_code: Option<String>,
}

impl AnalysisReport {
    /// First loop outcome that was not a success, in stage order.
    pub fn first_failure(&self) -> Option<RepairOutcome> {
        let repair = self.repair.as_ref().map(|stage| stage.outcome);
        let tests = self.tests.as_ref().and_then(|tests| tests.outcome);
        [repair, tests]
            .into_iter()
            .flatten()
            .find(|outcome| !outcome.is_success())
    }
}

/// Progress notifications, emitted as each step completes.
#[derive(Debug, Clone, Copy)]
pub enum PipelineEvent<'a> {
    Forecast(&'a str),
    RepairRound(&'a RoundRecord),
    Critique(&'a Critique),
    CriticRound(&'a RoundRecord),
    TestsGenerated { test_file: &'a str, code: &'a str },
    TestRound(&'a TestRoundRecord),
    Skipped { stage: &'static str, reason: &'a str },
}

/// Validate `request`, give it a fresh session under `data_dir`, and analyze it.
pub fn analyze_request<R, C, T, F>(
    services: &Services<'_, R, C, T>,
    config: &LabConfig,
    data_dir: &Path,
    request: &AnalyzeRequest,
    on_event: F,
) -> Result<AnalysisReport>
where
    R: CodeRunner + ?Sized,
    C: Completer + ?Sized,
    T: TestRunner + ?Sized,
    F: FnMut(PipelineEvent<'_>),
{
    validate_request(request)?;
    let code = &request.code_request;
    let session = create_session(data_dir, &code.filename, &code.code)?;
    info!(session = %session.id, agents = ?request.agents, "session created");

    let plan = AnalysisPlan {
        agents: request.agents,
        user_prompt: code.user_prompt.clone(),
        session_id: Some(session.id),
    };
    run_analysis(services, config, &session.files, &plan, on_event)
}

/// Run the stages selected in `plan` against the working file in `files`.
///
/// The working file is overwritten by accepted fixes. The report is written
/// to `files.report_path` before returning.
#[instrument(skip_all, fields(file = %files.filename))]
pub fn run_analysis<R, C, T, F>(
    services: &Services<'_, R, C, T>,
    config: &LabConfig,
    files: &WorkingFiles,
    plan: &AnalysisPlan,
    mut on_event: F,
) -> Result<AnalysisReport>
where
    R: CodeRunner + ?Sized,
    C: Completer + ?Sized,
    T: TestRunner + ?Sized,
    F: FnMut(PipelineEvent<'_>),
{
    let prompts = PromptEngine::new()?;
    let ctx = AgentContext::new(
        &prompts,
        config.completion.temperature,
        plan.user_prompt.as_deref(),
    );
    let agents = plan.agents;
    let mut report = AnalysisReport {
        session_id: plan.session_id.clone(),
        filename: files.filename.clone(),
        forecast: None,
        repair: None,
        clean: None,
        tests: None,
        final_code: None,
    };

    if agents.forecast {
        let forecast = forecast_failures(services.completer, &ctx, &files.read_source()?)?;
        on_event(PipelineEvent::Forecast(&forecast));
        report.forecast = Some(forecast);
    }

    let mut code_runs = true;
    if agents.runs_code() {
        let repair = repair_loop(
            services.runner,
            services.completer,
            &ctx,
            &files.source_path,
            config.max_rounds,
            agents.debug,
            |record| on_event(PipelineEvent::RepairRound(record)),
        )?;
        code_runs = repair.outcome.is_success();
        report.final_code = repair.final_code;
        report.repair = Some(RepairStage {
            outcome: repair.outcome,
            rounds: repair.rounds,
        });
    }

    if agents.clean {
        report.clean = Some(if code_runs {
            clean_stage(services, config, files, &ctx, &mut on_event)?
        } else {
            on_event(PipelineEvent::Skipped {
                stage: "clean",
                reason: SKIPPED_AFTER_FAILED_RUN,
            });
            CleanReport {
                note: Some(SKIPPED_AFTER_FAILED_RUN.to_string()),
                ..CleanReport::default()
            }
        });
    }

    if agents.tests {
        report.tests = Some(if code_runs {
            let (tests, final_code) = tests_stage(services, config, files, &ctx, &mut on_event)?;
            if final_code.is_some() {
                report.final_code = final_code;
            }
            tests
        } else {
            on_event(PipelineEvent::Skipped {
                stage: "tests",
                reason: SKIPPED_AFTER_FAILED_RUN,
            });
            TestsReport {
                note: Some(SKIPPED_AFTER_FAILED_RUN.to_string()),
                ..TestsReport::default()
            }
        });
    }

    write_json(&files.report_path, &report)
        .with_context(|| format!("write report {}", files.report_path.display()))?;
    info!(
        failure = ?report.first_failure(),
        report = %files.report_path.display(),
        "analysis finished"
    );
    Ok(report)
}

fn clean_stage<R, C, T, F>(
    services: &Services<'_, R, C, T>,
    config: &LabConfig,
    files: &WorkingFiles,
    ctx: &AgentContext<'_>,
    on_event: &mut F,
) -> Result<CleanReport>
where
    R: CodeRunner + ?Sized,
    C: Completer + ?Sized,
    T: TestRunner + ?Sized,
    F: FnMut(PipelineEvent<'_>),
{
    let critique = critic_review(services.completer, ctx, &files.read_source()?)?;
    on_event(PipelineEvent::Critique(&critique));

    let mut clean = CleanReport {
        reasoning: Some(critique.reasoning.clone()),
        improved_code: critique.improved_code.clone(),
        ..CleanReport::default()
    };
    let Some(improved) = critique.improved_code else {
        return Ok(clean);
    };

    write_text(&files.critic_path, &improved)?;
    clean.critic_file = Some(file_name(&files.critic_path));

    let validation = repair_loop(
        services.runner,
        services.completer,
        ctx,
        &files.critic_path,
        config.max_rounds,
        true,
        |record| on_event(PipelineEvent::CriticRound(record)),
    )?;
    if validation.outcome.is_success() {
        fs::copy(&files.critic_path, &files.cleaned_path).with_context(|| {
            format!(
                "copy {} to {}",
                files.critic_path.display(),
                files.cleaned_path.display()
            )
        })?;
        clean.cleaned_file = Some(file_name(&files.cleaned_path));
    } else {
        let error = validation
            .last_error()
            .map(|stderr| truncate_chars(stderr, CRITIC_ERROR_LIMIT).to_string());
        warn!(outcome = ?validation.outcome, "critic rewrite did not run cleanly");
        clean.error_in_critic = error;
    }
    clean.validation = Some(RepairStage {
        outcome: validation.outcome,
        rounds: validation.rounds,
    });
    Ok(clean)
}

fn tests_stage<R, C, T, F>(
    services: &Services<'_, R, C, T>,
    config: &LabConfig,
    files: &WorkingFiles,
    ctx: &AgentContext<'_>,
    on_event: &mut F,
) -> Result<(TestsReport, Option<String>)>
where
    R: CodeRunner + ?Sized,
    C: Completer + ?Sized,
    T: TestRunner + ?Sized,
    F: FnMut(PipelineEvent<'_>),
{
    let generated = generate_unit_tests(
        services.completer,
        ctx,
        &files.read_source()?,
        files.module_name(),
    )?;
    let Some(test_code) = generated else {
        warn!("test writer returned no code");
        let tests = TestsReport {
            note: Some(TEST_GENERATION_FAILED.to_string()),
            ..TestsReport::default()
        };
        return Ok((tests, None));
    };

    write_text(&files.test_path, &test_code)?;
    let test_file = file_name(&files.test_path);
    on_event(PipelineEvent::TestsGenerated {
        test_file: &test_file,
        code: &test_code,
    });

    let cycle = test_repair_loop(
        services.test_runner,
        services.completer,
        ctx,
        files,
        &config.tests,
        config.max_rounds,
        |record| on_event(PipelineEvent::TestRound(record)),
    )?;
    let tests = TestsReport {
        test_file: Some(test_file),
        test_code: Some(test_code),
        rounds: cycle.rounds,
        outcome: Some(cycle.outcome),
        note: None,
    };
    Ok((tests, cycle.final_code))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
