//! The aggregate record returned by a pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::core::{StageId, StageOutcome, StageResult};

/// One entry of a run's error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// The stage that reported the error.
    pub stage: StageId,
    /// What went wrong.
    pub error: String,
}

/// Everything a run produced.
///
/// Owned by the caller once returned. A run that degraded still reports
/// `success = true`; only run-level problems (empty input) set it to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Run identifier.
    pub run_id: Uuid,
    /// False only for run-level failures.
    pub success: bool,
    /// The synthesized response.
    pub response: String,
    /// Wall-clock time of the whole run.
    pub elapsed_ms: u64,
    /// Sum of the tokens reported by every stage.
    pub total_tokens: u64,
    /// Stages that ran (skipped stages excluded), in execution order.
    pub executed_stages: Vec<StageId>,
    /// One result per scheduled stage reached, in execution order.
    pub stage_results: Vec<StageResult>,
    /// One flag per stage in canonical order: `1`, `F`, `S` or `0`.
    pub success_flags: String,
    /// Elapsed time per stage.
    pub stage_timings: BTreeMap<StageId, u64>,
    /// Errors and degradation notes.
    pub error_log: Vec<ErrorLogEntry>,
    /// True if the run was cancelled before all stages ran.
    pub cancelled: bool,
    /// Run-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunResult {
    /// A run that failed before any stage ran.
    #[must_use]
    pub fn failed(run_id: Uuid, error: impl Into<String>, elapsed_ms: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            success: false,
            response: String::new(),
            elapsed_ms,
            total_tokens: 0,
            executed_stages: Vec::new(),
            stage_results: Vec::new(),
            success_flags: success_flags(&[]),
            stage_timings: BTreeMap::new(),
            error_log: Vec::new(),
            cancelled: false,
            error: Some(error.into()),
            started_at,
        }
    }

    /// Returns the result of `stage`, if it was reached.
    #[must_use]
    pub fn result(&self, stage: StageId) -> Option<&StageResult> {
        self.stage_results.iter().find(|result| result.stage == stage)
    }

    /// Stages whose output came from the fallback provider.
    #[must_use]
    pub fn fallback_stages(&self) -> Vec<StageId> {
        self.stage_results
            .iter()
            .filter(|result| result.used_fallback())
            .map(|result| result.stage)
            .collect()
    }

    /// Returns true if any stage relied on fallback output.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.stage_results.iter().any(StageResult::used_fallback)
    }
}

/// Builds the fixed-width flag string over the canonical stage order.
#[must_use]
pub fn success_flags(results: &[StageResult]) -> String {
    StageId::ALL
        .iter()
        .map(|&stage| {
            results
                .iter()
                .find(|result| result.stage == stage)
                .map_or('0', |result| result.outcome.flag())
        })
        .collect()
}

/// Sums token usage over all results.
#[must_use]
pub fn total_tokens(results: &[StageResult]) -> u64 {
    results.iter().map(|result| result.tokens_used).sum()
}

pub(crate) fn executed_stages(results: &[StageResult]) -> Vec<StageId> {
    results
        .iter()
        .filter(|result| result.outcome != StageOutcome::Skipped)
        .map(|result| result.stage)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JsonObject;

    #[test]
    fn test_flags_cover_canonical_order() {
        let results = vec![
            StageResult::success(StageId::Agape, JsonObject::new(), 10),
            StageResult::skipped(StageId::ThaliaRose, "serious"),
            StageResult::fallback(StageId::Eris, JsonObject::new(), "down"),
        ];
        assert_eq!(success_flags(&results), "1F0S0");
        assert_eq!(success_flags(&[]), "00000");
    }

    #[test]
    fn test_token_sum_counts_zero_for_fallback() {
        let results = vec![
            StageResult::success(StageId::Agape, JsonObject::new(), 15),
            StageResult::fallback(StageId::Eris, JsonObject::new(), "down"),
            StageResult::success(StageId::Metis, JsonObject::new(), 27),
        ];
        assert_eq!(total_tokens(&results), 42);
    }

    #[test]
    fn test_executed_excludes_skipped() {
        let results = vec![
            StageResult::success(StageId::Agape, JsonObject::new(), 0),
            StageResult::skipped(StageId::Eris, "calm"),
        ];
        assert_eq!(executed_stages(&results), vec![StageId::Agape]);
    }

    #[test]
    fn test_failed_run_serializes() {
        let run = RunResult::failed(Uuid::nil(), "Input text must not be empty", 0, Utc::now());
        let value = serde_json::to_value(&run).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Input text must not be empty");
        assert_eq!(value["success_flags"], "00000");
    }
}
