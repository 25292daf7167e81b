//! Remote code execution.
//!
//! The [`CodeRunner`] trait decouples the repair loop from the sandbox backend
//! (a Piston-compatible `execute` endpoint). Tests use scripted runners that
//! return predetermined results without touching the network.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ExecutionResult, SourceFile};
use crate::io::config::SandboxConfig;

/// Executes a source file somewhere other than this process.
pub trait CodeRunner {
    /// Run `file` and return its trimmed stdout and stderr.
    ///
    /// Transport failures are errors; a program that crashes is not.
    fn run(&self, file: &SourceFile) -> Result<ExecutionResult>;
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<ExecuteFile<'a>>,
}

#[derive(Debug, Serialize)]
struct ExecuteFile<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    run: RunStage,
}

#[derive(Debug, Deserialize)]
struct RunStage {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

/// Runner backed by a Piston `execute` endpoint.
pub struct PistonRunner {
    client: Client,
    url: String,
    language: String,
    version: String,
}

impl PistonRunner {
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build sandbox http client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            language: config.language.clone(),
            version: config.version.clone(),
        })
    }
}

impl CodeRunner for PistonRunner {
    #[instrument(skip_all, fields(file = %file.name, language = %self.language))]
    fn run(&self, file: &SourceFile) -> Result<ExecutionResult> {
        info!(bytes = file.content.len(), "submitting file to sandbox");
        let request = ExecuteRequest {
            language: &self.language,
            version: &self.version,
            files: vec![ExecuteFile {
                name: &file.name,
                content: &file.content,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .context("send sandbox request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(%status, "sandbox rejected request");
            return Err(anyhow!("sandbox error {status}: {}", body.trim()));
        }

        let body = response.text().context("read sandbox response")?;
        let result = parse_execute_response(&body)?;
        debug!(
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "sandbox run finished"
        );
        Ok(result)
    }
}

fn parse_execute_response(body: &str) -> Result<ExecutionResult> {
    let parsed: ExecuteResponse =
        serde_json::from_str(body).context("parse sandbox response")?;
    Ok(ExecutionResult {
        stdout: parsed.run.stdout.trim().to_string(),
        stderr: parsed.run.stderr.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_trims_run_output() {
        let body = r#"{"language":"python","version":"3.10.0","run":{"stdout":"1\n","stderr":"","code":0,"output":"1\n"}}"#;
        let result = parse_execute_response(body).expect("parse");
        assert_eq!(result.stdout, "1");
        assert!(result.is_clean());
    }

    #[test]
    fn keeps_error_text() {
        let body = r#"{"run":{"stdout":"","stderr":"Traceback (most recent call last):\nZeroDivisionError: division by zero\n"}}"#;
        let result = parse_execute_response(body).expect("parse");
        assert!(result.stderr.ends_with("ZeroDivisionError: division by zero"));
    }

    #[test]
    fn missing_run_section_is_an_error() {
        let err = parse_execute_response(r#"{"message":"runtime unknown"}"#).unwrap_err();
        assert!(err.to_string().contains("parse sandbox response"));
    }

    #[test]
    fn request_serializes_expected_shape() {
        let request = ExecuteRequest {
            language: "python",
            version: "3.10.0",
            files: vec![ExecuteFile {
                name: "user.py",
                content: "print(1)",
            }],
        };
        let value = serde_json::to_value(&request).expect("json");
        assert_eq!(value["language"], "python");
        assert_eq!(value["files"][0]["name"], "user.py");
        assert_eq!(value["files"][0]["content"], "print(1)");
    }
}
