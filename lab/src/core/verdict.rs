//! Pass/fail classification of a local test run.

use serde::{Deserialize, Serialize};

use crate::core::types::TestRun;

/// Marker searched for by [`VerdictPolicy::FailureMarker`] unless configured.
pub const DEFAULT_FAILURE_MARKER: &str = "FAILED";

/// How a test run is judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPolicy {
    /// Fails when the combined output contains the failure marker anywhere,
    /// including text the program under test printed itself, or on a timeout.
    #[default]
    FailureMarker,
    /// Fails on a non-zero exit status or a timeout.
    ExitCode,
}

impl VerdictPolicy {
    pub fn passed(&self, run: &TestRun, marker: &str) -> bool {
        match self {
            VerdictPolicy::FailureMarker => !run.timed_out && !run.output.contains(marker),
            VerdictPolicy::ExitCode => !run.timed_out && run.exit_code == Some(0),
        }
    }
}
