//! Shared application state for the API server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use codelab::io::completion::ChatCompletionClient;
use codelab::io::config::LabConfig;
use codelab::io::sandbox::PistonRunner;
use codelab::io::test_runner::CommandTestRunner;
use codelab::pipeline::{AnalysisReport, AnalyzeRequest, PipelineEvent, Services, analyze_request};
use tracing::debug;

/// Runs one analysis to completion. Called on the blocking thread pool.
pub trait Backend: Send + Sync {
    fn analyze(
        &self,
        config: &LabConfig,
        data_dir: &Path,
        request: &AnalyzeRequest,
    ) -> Result<AnalysisReport>;
}

/// Backend talking to the configured sandbox, completion service and local
/// test command.
pub struct LiveBackend;

impl Backend for LiveBackend {
    fn analyze(
        &self,
        config: &LabConfig,
        data_dir: &Path,
        request: &AnalyzeRequest,
    ) -> Result<AnalysisReport> {
        let runner = PistonRunner::new(&config.sandbox)?;
        let completer = ChatCompletionClient::from_env(&config.completion)?;
        let test_runner = CommandTestRunner::new(&config.tests);
        let services = Services {
            runner: &runner,
            completer: &completer,
            test_runner: &test_runner,
        };
        analyze_request(&services, config, data_dir, request, log_event)
    }
}

fn log_event(event: PipelineEvent<'_>) {
    match event {
        PipelineEvent::RepairRound(record) | PipelineEvent::CriticRound(record) => {
            debug!(
                round = record.round,
                clean = record.execution.is_clean(),
                "round finished"
            );
        }
        PipelineEvent::TestRound(record) => {
            debug!(round = record.round, passed = record.passed, "test round finished");
        }
        PipelineEvent::Skipped { stage, reason } => debug!(stage, reason, "stage skipped"),
        _ => {}
    }
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LabConfig>,
    /// Parent of every session directory.
    pub data_dir: PathBuf,
    pub backend: Arc<dyn Backend>,
}

impl AppState {
    pub fn new(config: LabConfig, data_dir: PathBuf, backend: Arc<dyn Backend>) -> Self {
        Self {
            config: Arc::new(config),
            data_dir,
            backend,
        }
    }
}
