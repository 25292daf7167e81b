//! Transition rules for the bounded run → diagnose → patch loop.
//!
//! The loop starts in `Running(1)`. Each round observes one run; a clean run
//! finishes with `Success`, a failing run asks for a patch. A patch moves to
//! the next round unless that round would exceed the limit.

use serde::{Deserialize, Serialize};

/// Position of the repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running(u32),
    Finished(RepairOutcome),
}

/// Terminal outcome of a repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// A run produced no error output.
    Success { round: u32 },
    /// Every allowed round was used and a patch was still pending.
    ExhaustedRetries { rounds: u32 },
    /// The debug agent returned no code, so the loop stopped early.
    FatalAbort { round: u32 },
    /// A run failed and debugging was not enabled.
    Unrepaired { round: u32 },
}

impl RepairOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RepairOutcome::Success { .. })
    }

    /// Number of rounds the loop ran.
    pub fn rounds(&self) -> u32 {
        match *self {
            RepairOutcome::Success { round }
            | RepairOutcome::FatalAbort { round }
            | RepairOutcome::Unrepaired { round } => round,
            RepairOutcome::ExhaustedRetries { rounds } => rounds,
        }
    }
}

/// What the loop does after observing a run in `round`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    Finish(RepairOutcome),
    RequestPatch,
}

pub const INITIAL: LoopState = LoopState::Running(1);

/// Decide after a run. `clean` is the run's success signal.
pub fn after_run(round: u32, clean: bool, debug_enabled: bool) -> RunDecision {
    if clean {
        RunDecision::Finish(RepairOutcome::Success { round })
    } else if debug_enabled {
        RunDecision::RequestPatch
    } else {
        RunDecision::Finish(RepairOutcome::Unrepaired { round })
    }
}

/// Decide after asking for a patch in `round`. `patched` is true when a fix was
/// returned and written over the working source.
pub fn after_patch(round: u32, max_rounds: u32, patched: bool) -> LoopState {
    if !patched {
        return LoopState::Finished(RepairOutcome::FatalAbort { round });
    }
    let next = round + 1;
    if next > max_rounds {
        LoopState::Finished(RepairOutcome::ExhaustedRetries { rounds: round })
    } else {
        LoopState::Running(next)
    }
}
