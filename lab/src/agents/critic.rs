//! Critic agent: quality review plus an optional improved rewrite.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::blocks::{PYTHON, REASONING, parse_reply};
use crate::core::types::{CompletionRequest, Critique};
use crate::io::completion::Completer;
use crate::io::prompt::CRITIC_PERSONA;

use super::AgentContext;

/// Reasoning reported when the reply carries no reasoning block.
pub const NO_REASONING: &str = "(No reasoning provided)";

#[instrument(skip_all, fields(code_len = code.len()))]
pub fn critic_review<C: Completer + ?Sized>(
    completer: &C,
    ctx: &AgentContext<'_>,
    code: &str,
) -> Result<Critique> {
    let prompt = ctx.prompts.render_critic(code, ctx.user_prompt)?;
    let request = CompletionRequest::new(CRITIC_PERSONA, prompt, ctx.temperature);
    let reply = completer.complete(&request)?;

    let mut parsed = parse_reply(&reply, &[REASONING, PYTHON]);
    let critique = Critique {
        reasoning: parsed
            .take(REASONING)
            .unwrap_or_else(|| NO_REASONING.to_string()),
        improved_code: parsed.take(PYTHON).filter(|code| !code.is_empty()),
    };
    debug!(
        has_rewrite = critique.improved_code.is_some(),
        "critic reply parsed"
    );
    Ok(critique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::ScriptedCompleter;

    #[test]
    fn missing_reasoning_gets_placeholder() {
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let completer = ScriptedCompleter::new(vec![
            "Here you go:\n```python\ndef main():\n    print(1)\n```".to_string(),
        ]);

        let critique = critic_review(&completer, &ctx, "print(1)").expect("critique");
        assert_eq!(critique.reasoning, NO_REASONING);
        assert_eq!(
            critique.improved_code.as_deref(),
            Some("def main():\n    print(1)")
        );
        assert_eq!(completer.requests()[0].persona(), CRITIC_PERSONA);
    }

    #[test]
    fn review_without_rewrite() {
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let completer =
            ScriptedCompleter::new(vec!["```reasoning\nAlready clean.\n```".to_string()]);

        let critique = critic_review(&completer, &ctx, "print(1)").expect("critique");
        assert_eq!(critique.reasoning, "Already clean.");
        assert_eq!(critique.improved_code, None);
    }
}
