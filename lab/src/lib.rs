//! Multi-agent run, debug, critique and test loop for a single source file.
//!
//! A working file is executed in a remote sandbox; while it fails, a debug
//! agent backed by a chat completion service proposes a full rewrite, bounded
//! by a round limit. Optional stages forecast likely failures, produce a
//! cleaned variant, and generate and repair against unit tests.
//!
//! - **[`core`]**: Pure, deterministic logic (block parsing, loop transitions,
//!   test verdicts, file naming). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, HTTP clients, prompts, local
//!   processes, session files). Every external service sits behind a trait.
//! - **[`agents`]**: One prompt and one reply interpretation per agent.
//!
//! [`looping`] and [`pipeline`] sequence the agents against the services.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
