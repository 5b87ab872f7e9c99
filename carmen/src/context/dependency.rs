//! Soft dependency resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{JsonObject, StageId};

/// Why a declared dependency has no usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// The dependency is scheduled after the dependent stage.
    NotYetRun,
    /// The dependency ran and produced nothing.
    Failed,
    /// The dependency was skipped by the early-exit policy.
    Skipped,
    /// The dependency is disabled in this pipeline.
    NotScheduled,
}

impl DegradedReason {
    /// Returns the snake-case label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetRun => "not_yet_run",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::NotScheduled => "not_scheduled",
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A best-effort stand-in for a dependency output, built from the raw input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedOutput {
    /// The dependency this stands in for.
    pub stage: StageId,
    /// Why the real output is missing.
    pub reason: DegradedReason,
    /// Fallback payload for the dependency.
    pub payload: JsonObject,
}

/// A dependency output: the real one, or a tagged degraded substitute.
pub type ResolvedDependency = Result<JsonObject, DegradedOutput>;
