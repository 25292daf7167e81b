//! Debug agent: proposes a full rewrite of a failing file.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::blocks::{PYTHON, REASONING, parse_reply};
use crate::core::types::{CompletionRequest, Patch};
use crate::io::completion::Completer;
use crate::io::prompt::DEBUGGER_PERSONA;

use super::AgentContext;

/// Ask for a fix of `code` given the error `trace` (stderr or test output).
///
/// `fixed_code` is `None` when the reply has no code block or an empty one;
/// callers must not overwrite the source in that case.
#[instrument(skip_all, fields(code_len = code.len(), trace_len = trace.len()))]
pub fn debug_patch<C: Completer + ?Sized>(
    completer: &C,
    ctx: &AgentContext<'_>,
    code: &str,
    trace: &str,
) -> Result<Patch> {
    let prompt = ctx.prompts.render_debugger(code, trace, ctx.user_prompt)?;
    let request = CompletionRequest::new(DEBUGGER_PERSONA, prompt, ctx.temperature);
    let reply = completer.complete(&request)?;

    let mut parsed = parse_reply(&reply, &[REASONING, PYTHON]);
    let patch = Patch {
        reasoning: parsed.take(REASONING),
        fixed_code: parsed.take(PYTHON).filter(|code| !code.is_empty()),
    };
    debug!(
        has_reasoning = patch.reasoning.is_some(),
        has_fix = patch.fixed_code.is_some(),
        "debug reply parsed"
    );
    Ok(patch)
}
