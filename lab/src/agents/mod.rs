//! Agents: build a prompt, call the completion service, interpret the reply.
//!
//! Each agent pairs one persona with one task template. None of them retries;
//! the loops in [`crate::looping`] decide what happens next.

use crate::io::prompt::PromptEngine;

pub mod critic;
pub mod debugger;
pub mod forecast;
pub mod test_writer;

/// Settings shared by every agent call within one analysis.
#[derive(Clone, Copy)]
pub struct AgentContext<'a> {
    pub prompts: &'a PromptEngine,
    pub temperature: f32,
    /// Free-text guidance from the user, applied only where relevant.
    pub user_prompt: Option<&'a str>,
}

impl<'a> AgentContext<'a> {
    pub fn new(prompts: &'a PromptEngine, temperature: f32, user_prompt: Option<&'a str>) -> Self {
        Self {
            prompts,
            temperature,
            user_prompt,
        }
    }
}
