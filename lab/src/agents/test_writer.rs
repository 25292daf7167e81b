//! Test generation agent: writes a pytest file for the working module.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::blocks::{PYTHON, extract_block};
use crate::core::types::CompletionRequest;
use crate::io::completion::Completer;
use crate::io::prompt::TEST_WRITER_PERSONA;

use super::AgentContext;

/// Generate tests importing from `module_name`. `None` when the reply has no
/// usable code block.
#[instrument(skip_all, fields(module = module_name))]
pub fn generate_unit_tests<C: Completer + ?Sized>(
    completer: &C,
    ctx: &AgentContext<'_>,
    code: &str,
    module_name: &str,
) -> Result<Option<String>> {
    let prompt = ctx
        .prompts
        .render_test_writer(code, module_name, ctx.user_prompt)?;
    let request = CompletionRequest::new(TEST_WRITER_PERSONA, prompt, ctx.temperature);
    let reply = completer.complete(&request)?;

    let tests = extract_block(&reply, PYTHON).filter(|code| !code.is_empty());
    debug!(generated = tests.is_some(), "test writer reply parsed");
    Ok(tests)
}
