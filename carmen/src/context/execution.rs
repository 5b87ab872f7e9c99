//! The per-stage execution context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ResolvedDependency, StageInputs};
use crate::cancellation::CancellationToken;
use crate::core::{JsonObject, StageId, StageOutputs};
use crate::fallback::summarize_stage_output;

const DEGRADED_SUMMARY_LEN: usize = 200;

/// Whether stages may call their live client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Normal operation.
    #[default]
    Live,
    /// Skip live calls and use fallback output directly.
    FallbackOnly,
}

/// Everything a stage sees when it runs.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: Uuid,
    base: JsonObject,
    inputs: StageInputs,
    cancel: CancellationToken,
    mode: ExecutionMode,
    fallback_enabled: bool,
}

impl StageContext {
    /// Creates a live context with no prior outputs.
    #[must_use]
    pub fn new(run_id: Uuid, base: JsonObject, inputs: StageInputs) -> Self {
        Self {
            run_id,
            base,
            inputs,
            cancel: CancellationToken::new(),
            mode: ExecutionMode::Live,
            fallback_enabled: true,
        }
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables fallback substitution.
    #[must_use]
    pub fn with_fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the caller-supplied context.
    #[must_use]
    pub fn base(&self) -> &JsonObject {
        &self.base
    }

    /// Returns the resolved inputs.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Whether fallback substitution is allowed.
    #[must_use]
    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolution of a declared dependency.
    #[must_use]
    pub fn dependency(&self, stage: StageId) -> Option<&ResolvedDependency> {
        self.inputs.dependency(stage)
    }

    /// Prior outputs merged with degraded dependency payloads.
    #[must_use]
    pub fn visible_outputs(&self) -> StageOutputs {
        self.inputs.visible_outputs()
    }

    /// Renders the user prompt for a live call.
    #[must_use]
    pub fn render_user_prompt(&self, input: &str) -> String {
        let prior: JsonObject = self
            .inputs
            .prior()
            .iter()
            .map(|(stage, output)| (stage.to_string(), Value::Object(output.clone())))
            .collect();
        let prior = serde_json::to_string_pretty(&prior).unwrap_or_else(|_| "{}".to_string());
        let base = serde_json::to_string_pretty(&self.base).unwrap_or_else(|_| "{}".to_string());

        let mut prompt =
            format!("User Message: {input}\n\nPrevious Stage Outputs: {prior}\n\nContext: {base}");

        let degraded: Vec<String> = self
            .inputs
            .degraded()
            .map(|d| {
                format!(
                    "- {} ({}): {}",
                    d.stage,
                    d.reason,
                    summarize_stage_output(&d.payload, DEGRADED_SUMMARY_LEN)
                )
            })
            .collect();
        if !degraded.is_empty() {
            prompt.push_str("\n\nDegraded Dependencies (estimated, not verified):\n");
            prompt.push_str(&degraded.join("\n"));
        }
        prompt
    }
}
