//! Deterministic substitute outputs for stages that cannot run live.
//!
//! The [`FallbackProvider`] builds a stage payload from the raw input text
//! and whatever earlier outputs are visible. It performs no I/O and uses no
//! randomness, so identical arguments always produce byte-identical JSON.

mod heuristics;
mod payloads;

pub use heuristics::{
    assess_severity, detect_conflict, detect_discord, estimate_sentiment, extract_keywords,
    extract_knowledge_gaps, extract_root_cause, summarize_stage_output, BasicContext, Sentiment,
};

pub(crate) use heuristics::contains_any;

use serde_json::Value;

use crate::core::{JsonObject, StageId, StageOutputs};

/// Builds fallback payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackProvider;

impl FallbackProvider {
    /// Creates a provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the fallback payload for `stage`.
    ///
    /// `outputs` holds the outputs visible to the stage; ERIS reads AGAPE,
    /// METIS reads ERIS and AGAPE.
    #[must_use]
    pub fn fallback_for(&self, stage: StageId, input: &str, outputs: &StageOutputs) -> JsonObject {
        let agape = outputs.get(&StageId::Agape);
        match stage {
            StageId::Agape => payloads::agape(input),
            StageId::Eris => payloads::eris(input, agape),
            StageId::Metis => payloads::metis(input, outputs.get(&StageId::Eris), agape),
            StageId::ThaliaRose => payloads::thalia_rose(),
            StageId::Thoth => payloads::thoth(),
        }
    }

    /// Returns the fallback payload for a stage given by name.
    ///
    /// Unknown names get a generic payload carrying the basic context.
    #[must_use]
    pub fn fallback_for_name(&self, name: &str, input: &str, outputs: &StageOutputs) -> JsonObject {
        if let Ok(stage) = name.parse::<StageId>() {
            return self.fallback_for(stage, input, outputs);
        }

        let mut payload = JsonObject::new();
        payload.insert("stage".to_string(), Value::String(name.to_string()));
        payload.insert(
            "reason".to_string(),
            Value::String("No fallback template for stage".to_string()),
        );
        payload.insert(
            "basic_context".to_string(),
            Value::Object(self.extract_basic_context(input).to_object()),
        );
        payload.insert("used_fallback".to_string(), Value::Bool(true));
        payload
    }

    /// Extracts the basic context summary from the raw input.
    #[must_use]
    pub fn extract_basic_context(&self, input: &str) -> BasicContext {
        BasicContext::extract(input)
    }
}
