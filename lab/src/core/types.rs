//! Shared deterministic types for the lab core.
//!
//! These are flat, transient records. Nothing here performs I/O; the `io`
//! adapters produce and consume them.

use serde::{Deserialize, Serialize};

/// A named source file as submitted to the execution sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// Captured output of one sandboxed execution.
///
/// Empty `stderr` is the success signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn is_clean(&self) -> bool {
        self.stderr.is_empty()
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Ordered messages for the completion service.
///
/// Always exactly one system message (the persona) followed by one user
/// message (the task prompt).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(persona: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: persona.into(),
                },
                ChatMessage {
                    role: Role::User,
                    content: prompt.into(),
                },
            ],
            temperature,
        }
    }

    /// Content of the user message.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// Content of the system message.
    pub fn persona(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Debug agent result. Both halves may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub reasoning: Option<String>,
    pub fixed_code: Option<String>,
}

/// Critic agent result. Reasoning always carries text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub reasoning: String,
    pub improved_code: Option<String>,
}

/// Output of one local test run (stdout and stderr combined).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub output: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Which optional stages a single analysis performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSelection {
    pub run: bool,
    pub debug: bool,
    pub clean: bool,
    pub forecast: bool,
    pub tests: bool,
}

impl AgentSelection {
    /// Every stage enabled.
    pub fn all() -> Self {
        Self {
            run: true,
            debug: true,
            clean: true,
            forecast: true,
            tests: true,
        }
    }

    /// Debugging implies running.
    pub fn runs_code(&self) -> bool {
        self.run || self.debug
    }
}

/// One iteration of the run/debug loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub execution: ExecutionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}

/// One iteration of the test/debug loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRoundRecord {
    pub round: u32,
    pub output: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}
