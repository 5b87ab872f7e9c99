//! Stage outcome labels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage produced (or did not produce) its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// The live call succeeded and its output validated.
    Success,
    /// The output was synthesized locally by the fallback provider.
    Fallback,
    /// No output could be produced (fallback disabled).
    Failure,
    /// The stage was skipped by the early-exit policy.
    Skipped,
}

impl StageOutcome {
    /// Single-character flag used in the run's success flag string.
    #[must_use]
    pub const fn flag(self) -> char {
        match self {
            Self::Success => '1',
            Self::Fallback => 'F',
            Self::Skipped => 'S',
            Self::Failure => '0',
        }
    }

    /// Returns true if the outcome carries a usable output.
    #[must_use]
    pub const fn has_output(self) -> bool {
        matches!(self, Self::Success | Self::Fallback)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Fallback => write!(f, "fallback"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}
