//! Stable exit codes for `codelab` commands.

use crate::core::repair::RepairOutcome;

/// Command succeeded, or every selected loop ended in success.
pub const OK: i32 = 0;
/// Invalid input or configuration, or a service/transport error.
pub const INVALID: i32 = 1;
/// A loop used every allowed round without converging.
pub const EXHAUSTED: i32 = 2;
/// A loop stopped because no fix was available (or debugging was off).
pub const NO_FIX: i32 = 3;

pub fn for_outcome(outcome: Option<RepairOutcome>) -> i32 {
    match outcome {
        None | Some(RepairOutcome::Success { .. }) => OK,
        Some(RepairOutcome::ExhaustedRetries { .. }) => EXHAUSTED,
        Some(RepairOutcome::FatalAbort { .. } | RepairOutcome::Unrepaired { .. }) => NO_FIX,
    }
}
