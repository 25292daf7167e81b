//! Forecast agent: static risk report, returned as raw markdown.

use anyhow::Result;
use tracing::instrument;

use crate::core::types::CompletionRequest;
use crate::io::completion::Completer;
use crate::io::prompt::FORECAST_PERSONA;

use super::AgentContext;

#[instrument(skip_all, fields(code_len = code.len()))]
pub fn forecast_failures<C: Completer + ?Sized>(
    completer: &C,
    ctx: &AgentContext<'_>,
    code: &str,
) -> Result<String> {
    let prompt = ctx.prompts.render_forecast(code, ctx.user_prompt)?;
    let request = CompletionRequest::new(FORECAST_PERSONA, prompt, ctx.temperature);
    let reply = completer.complete(&request)?;
    Ok(reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::ScriptedCompleter;

    #[test]
    fn returns_reply_without_block_extraction() {
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = AgentContext::new(&prompts, 0.2, None);
        let report = "### ForecastAgent Risk Report\n\n- **ZeroDivisionError**\n```python\nprint(1/0)\n```";
        let completer = ScriptedCompleter::new(vec![format!("\n{report}\n\n")]);

        let forecast = forecast_failures(&completer, &ctx, "print(1/0)").expect("forecast");
        assert_eq!(forecast, report);
        assert_eq!(completer.requests()[0].persona(), FORECAST_PERSONA);
    }
}
