//! Skipping optional stages that cannot contribute to the response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{StageId, StageResult};
use crate::fallback::contains_any;
use crate::stages::StageDescriptor;

const CONFLICT_KEYWORDS: [&str; 11] = [
    "frustrated", "angry", "upset", "mad", "hate", "conflict", "problem", "issue", "wrong", "broken",
    "failed",
];

const SERIOUS_KEYWORDS: [&str; 8] = [
    "death", "crisis", "emergency", "urgent", "critical", "failed", "error", "broken",
];

/// Decides which optional stages a run may skip.
///
/// Required stages are never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyExitPolicy {
    /// Master switch.
    pub enable_early_exit: bool,
    /// Skip ERIS when the input carries no sign of conflict.
    pub skip_eris_if_no_discord: bool,
    /// Skip THALIA_ROSE on serious topics.
    pub skip_humor_if_not_applicable: bool,
}

impl Default for EarlyExitPolicy {
    fn default() -> Self {
        Self {
            enable_early_exit: true,
            skip_eris_if_no_discord: true,
            skip_humor_if_not_applicable: true,
        }
    }
}

impl EarlyExitPolicy {
    /// A policy that never skips anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_early_exit: false,
            ..Self::default()
        }
    }

    /// Returns why `stage` should be skipped, or `None` to run it.
    ///
    /// `previous` holds the results recorded so far in this run.
    #[must_use]
    pub fn skip_reason(
        &self,
        stage: &StageDescriptor,
        input: &str,
        previous: &[StageResult],
    ) -> Option<String> {
        if !self.enable_early_exit || stage.required {
            return None;
        }
        match stage.id {
            StageId::Eris if self.skip_eris_if_no_discord => {
                (!contains_any(input, &CONFLICT_KEYWORDS))
                    .then(|| "no discord indicators in input".to_string())
            }
            StageId::ThaliaRose if self.skip_humor_if_not_applicable => {
                if contains_any(input, &SERIOUS_KEYWORDS) {
                    return Some("serious topic, humor not applicable".to_string());
                }
                let severity = previous
                    .iter()
                    .find(|result| result.stage == StageId::Eris)
                    .and_then(|result| result.field("severity"))
                    .and_then(Value::as_str);
                matches!(severity, Some("critical" | "high"))
                    .then(|| format!("ERIS reported {} severity", severity.unwrap_or_default()))
            }
            _ => None,
        }
    }
}
