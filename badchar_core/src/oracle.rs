use crate::executor::ProcessOutcome;
use serde::Serialize;
use std::fmt;

/// Classification of one transformer run.
///
/// Derived only from process-level facts and the recounted output bytes; the
/// transformer's own claims on stdout/stderr never enter into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    NullsRemaining,
    Error,
    Timeout,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::NullsRemaining => "NULLS_REMAINING",
            RunStatus::Error => "ERROR",
            RunStatus::Timeout => "TIMEOUT",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluated in order: timeout, success, residual bad bytes, non-zero exit,
/// then the `Failed` fallback (exit zero without an output file).
pub fn classify(outcome: &ProcessOutcome) -> RunStatus {
    if outcome.timed_out {
        return RunStatus::Timeout;
    }
    let exited_zero = outcome.exit_code == Some(0);
    match (exited_zero, outcome.bad_bytes_remaining) {
        (true, Some(0)) => RunStatus::Success,
        (true, Some(_)) => RunStatus::NullsRemaining,
        // Killed by a signal counts as a non-zero exit.
        (false, _) => RunStatus::Error,
        (true, None) => RunStatus::Failed,
    }
}
