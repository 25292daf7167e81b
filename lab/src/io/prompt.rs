//! Prompt rendering for the agents.
//!
//! Templates live in `io/prompts/` and are compiled into the binary. Each
//! agent pairs a fixed persona (the system message) with one rendered task
//! prompt (the user message).

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const GUIDANCE_TEMPLATE: &str = include_str!("prompts/guidance.md");
const DEBUGGER_TEMPLATE: &str = include_str!("prompts/debugger.md");
const CRITIC_TEMPLATE: &str = include_str!("prompts/critic.md");
const FORECAST_TEMPLATE: &str = include_str!("prompts/forecast.md");
const TEST_WRITER_TEMPLATE: &str = include_str!("prompts/test_writer.md");

pub const DEBUGGER_PERSONA: &str = "You are DebuggerAgent, a careful Python bug fixer.";
pub const CRITIC_PERSONA: &str = "You are CriticAgent, a senior Python code reviewer and improver.";
pub const FORECAST_PERSONA: &str = "You are ForecastAgent, an advanced static code analyzer. \
Your goal is to predict the most likely runtime failures before execution, based on real logic \
and structure of the code.";
pub const TEST_WRITER_PERSONA: &str = "You are AutoTestAgent, a senior Python unit test generator.";

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("guidance", GUIDANCE_TEMPLATE)
            .context("load guidance template")?;
        env.add_template("debugger", DEBUGGER_TEMPLATE)
            .context("load debugger template")?;
        env.add_template("critic", CRITIC_TEMPLATE)
            .context("load critic template")?;
        env.add_template("forecast", FORECAST_TEMPLATE)
            .context("load forecast template")?;
        env.add_template("test_writer", TEST_WRITER_TEMPLATE)
            .context("load test writer template")?;
        Ok(Self { env })
    }

    pub fn render_debugger(
        &self,
        code: &str,
        trace: &str,
        user_prompt: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("debugger")?;
        let rendered = template
            .render(context! {
                code => code,
                trace => trace,
                user_prompt => guidance(user_prompt),
            })
            .context("render debugger prompt")?;
        Ok(rendered)
    }

    pub fn render_critic(&self, code: &str, user_prompt: Option<&str>) -> Result<String> {
        let template = self.env.get_template("critic")?;
        let rendered = template
            .render(context! {
                code => code,
                user_prompt => guidance(user_prompt),
            })
            .context("render critic prompt")?;
        Ok(rendered)
    }

    pub fn render_forecast(&self, code: &str, user_prompt: Option<&str>) -> Result<String> {
        let template = self.env.get_template("forecast")?;
        let rendered = template
            .render(context! {
                code => code,
                user_prompt => guidance(user_prompt),
            })
            .context("render forecast prompt")?;
        Ok(rendered)
    }

    pub fn render_test_writer(
        &self,
        code: &str,
        module_name: &str,
        user_prompt: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("test_writer")?;
        let rendered = template
            .render(context! {
                code => code,
                module_name => module_name,
                user_prompt => guidance(user_prompt),
            })
            .context("render test writer prompt")?;
        Ok(rendered)
    }
}

fn guidance(user_prompt: Option<&str>) -> Option<&str> {
    user_prompt.map(str::trim).filter(|s| !s.is_empty())
}
