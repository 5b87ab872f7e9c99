//! The per-stage result record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{JsonObject, StageId, StageOutcome};

/// Outputs of earlier stages, keyed by stage and iterated in canonical order.
pub type StageOutputs = BTreeMap<StageId, JsonObject>;

/// The result of running one stage once.
///
/// Results are built through the factory methods and the `with_*` setters,
/// then handed to the run record, which never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage that produced this result.
    pub stage: StageId,
    /// How the result was produced.
    pub outcome: StageOutcome,
    /// The stage output, present for `Success` and `Fallback`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonObject>,
    /// Error or degradation note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time spent in the stage.
    pub elapsed_ms: u64,
    /// Tokens reported by the provider (zero for fallback output).
    pub tokens_used: u64,
    /// Additional metadata.
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub metadata: JsonObject,
}

impl StageResult {
    /// Creates a result for a validated live output.
    #[must_use]
    pub fn success(stage: StageId, output: JsonObject, tokens_used: u64) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Success,
            output: Some(output),
            error: None,
            elapsed_ms: 0,
            tokens_used,
            metadata: JsonObject::new(),
        }
    }

    /// Creates a result for a locally synthesized output.
    #[must_use]
    pub fn fallback(stage: StageId, output: JsonObject, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut metadata = JsonObject::new();
        metadata.insert("used_fallback".to_string(), Value::Bool(true));
        metadata.insert("fallback_reason".to_string(), Value::String(reason.clone()));
        Self {
            stage,
            outcome: StageOutcome::Fallback,
            output: Some(output),
            error: Some(reason),
            elapsed_ms: 0,
            tokens_used: 0,
            metadata,
        }
    }

    /// Creates a result for a stage that produced nothing.
    #[must_use]
    pub fn failure(stage: StageId, error: impl Into<String>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Failure,
            output: None,
            error: Some(error.into()),
            elapsed_ms: 0,
            tokens_used: 0,
            metadata: JsonObject::new(),
        }
    }

    /// Creates a result for a stage skipped by the early-exit policy.
    #[must_use]
    pub fn skipped(stage: StageId, reason: impl Into<String>) -> Self {
        let mut metadata = JsonObject::new();
        metadata.insert("skip_reason".to_string(), Value::String(reason.into()));
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            output: None,
            error: None,
            elapsed_ms: 0,
            tokens_used: 0,
            metadata,
        }
    }

    /// Sets the elapsed time.
    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns true if the output came from the fallback provider.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.outcome == StageOutcome::Fallback
    }

    /// Returns the output if the outcome carries one.
    #[must_use]
    pub fn usable_output(&self) -> Option<&JsonObject> {
        if self.outcome.has_output() {
            self.output.as_ref()
        } else {
            None
        }
    }

    /// Reads a top-level field of the output.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.usable_output().and_then(|output| output.get(key))
    }

    /// Returns the skip reason for skipped results.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&str> {
        self.metadata.get("skip_reason").and_then(Value::as_str)
    }
}
