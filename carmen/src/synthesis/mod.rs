//! Composing one response from the stage results.
//!
//! Stages contribute in canonical order. A stage with no usable output, or
//! with nothing worth saying (no discord, no appropriate humor), is left out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

use crate::core::{JsonObject, StageId, StageOutcome, StageResult};

/// Returned when no stage contributed anything.
pub const DEFAULT_RESPONSE: &str = "I understand. Let me help you with that.";

const TRUNCATION_NOTE: &str = " (Response truncated)";

/// Response tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Sections separated by blank lines.
    #[default]
    Balanced,
    /// Same layout as balanced.
    Warm,
    /// Same layout as balanced.
    Professional,
    /// Sections separated by single line breaks.
    Concise,
}

/// Synthesizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Response tone.
    pub tone: Tone,
    /// Include THALIA_ROSE humor when it was judged appropriate.
    pub include_humor: bool,
    /// Append THOTH verification markers.
    pub include_truth_markers: bool,
    /// Maximum response length in characters, excluding the provenance note.
    pub max_length: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            tone: Tone::Balanced,
            include_humor: true,
            include_truth_markers: true,
            max_length: 2000,
        }
    }
}

/// Deterministically composes the final response text.
#[derive(Debug, Clone, Default)]
pub struct ResponseSynthesizer {
    config: SynthesisConfig,
}

impl ResponseSynthesizer {
    /// Creates a synthesizer.
    #[must_use]
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Returns the settings.
    #[must_use]
    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Builds the response for a run's results.
    #[must_use]
    pub fn synthesize(&self, results: &[StageResult]) -> String {
        let output = |stage: StageId| {
            results
                .iter()
                .find(|result| result.stage == stage)
                .and_then(StageResult::usable_output)
        };

        let mut parts = Vec::new();
        if let Some(agape) = output(StageId::Agape) {
            parts.push(format_agape(agape));
        }
        if let Some(eris) = output(StageId::Eris) {
            if flag(eris, "discord_detected") {
                parts.push(format_eris(eris));
            }
        }
        if let Some(metis) = output(StageId::Metis) {
            parts.push(format_metis(metis));
        }
        if self.config.include_humor {
            if let Some(humor) = output(StageId::ThaliaRose) {
                if flag(humor, "humor_detected") && flag(humor, "humor_appropriate") {
                    parts.push(text(humor, "humor_text").to_string());
                }
            }
        }

        let mut response = self.combine(parts);
        if self.config.include_truth_markers {
            if let Some(thoth) = output(StageId::Thoth) {
                response.push_str(&truth_markers(thoth));
            }
        }

        let mut response = truncate(response.trim(), self.config.max_length);
        if let Some(note) = self.provenance_note(results) {
            response.push_str("\n\n");
            response.push_str(&note);
        }
        response
    }

    fn combine(&self, parts: Vec<String>) -> String {
        let parts: Vec<String> = parts.into_iter().filter(|p| !p.trim().is_empty()).collect();
        if parts.is_empty() {
            return DEFAULT_RESPONSE.to_string();
        }
        let separator = if self.config.tone == Tone::Concise { "\n" } else { "\n\n" };
        parts.join(separator)
    }

    fn provenance_note(&self, results: &[StageResult]) -> Option<String> {
        let estimated: Vec<&str> = results
            .iter()
            .filter(|result| result.used_fallback())
            .map(|result| result.stage.as_str())
            .collect();
        let unverified = self.config.include_truth_markers
            && !results
                .iter()
                .any(|result| result.stage == StageId::Thoth && result.outcome == StageOutcome::Success);

        let mut note = String::new();
        if !estimated.is_empty() {
            let _ = write!(note, "Parts of this response are estimated ({}).", estimated.join(", "));
        }
        if unverified {
            if !note.is_empty() {
                note.push(' ');
            }
            note.push_str("Claims have not been verified.");
        }
        (!note.is_empty()).then(|| format!("*({note})*"))
    }
}

fn flag(output: &JsonObject, key: &str) -> bool {
    output.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn text<'a>(output: &'a JsonObject, key: &str) -> &'a str {
    output.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn format_agape(agape: &JsonObject) -> String {
    let mut lines = Vec::new();
    let actions: Vec<&str> = agape
        .get("loving_actions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !actions.is_empty() {
        lines.push("Here's what I can do to help RIGHT NOW:".to_string());
        for (i, action) in actions.iter().enumerate() {
            lines.push(format!("{}. {action}", i + 1));
        }
    }
    let why = text(agape, "why_loving");
    if !why.is_empty() {
        lines.push(format!("\n{why}"));
    }
    lines.join("\n")
}

fn format_eris(eris: &JsonObject) -> String {
    let mut lines = Vec::new();
    let root_cause = text(eris, "root_cause");
    if !root_cause.is_empty() {
        lines.push(format!("I see the issue: {root_cause}"));
    }
    let prevention = text(eris, "prevention_strategy");
    if !prevention.is_empty() {
        lines.push(format!("Going forward: {prevention}"));
    }
    lines.join("\n")
}

fn format_metis(metis: &JsonObject) -> String {
    let Some(empathy) = metis.get("empathy_analysis").and_then(Value::as_object) else {
        return String::new();
    };
    let mut lines = Vec::new();
    let needs = text(empathy, "user_needs");
    if !needs.is_empty() {
        lines.push(needs.to_string());
    }
    let bridge = text(empathy, "bridge");
    if !bridge.is_empty() {
        lines.push(format!("\n{bridge}"));
    }
    lines.join("\n")
}

fn truth_markers(thoth: &JsonObject) -> String {
    let count = |key: &str| thoth.get(key).and_then(Value::as_u64).unwrap_or(0);
    let verified = count("verified_claims");
    let unverified = count("unverified_claims");
    if unverified > 0 {
        format!(
            "\n\n*(Note: Some claims are unverified or theoretical. Verified: {verified}, Unverified: {unverified})*"
        )
    } else if verified > 0 {
        "\n\n*(All claims verified)*".to_string()
    } else {
        String::new()
    }
}

/// Cuts `response` to `max_len` characters at the last sentence boundary.
fn truncate(response: &str, max_len: usize) -> String {
    if response.chars().count() <= max_len {
        return response.to_string();
    }
    let cut: String = response.chars().take(max_len).collect();
    match cut.rfind('.') {
        Some(pos) => format!("{}{TRUNCATION_NOTE}", &cut[..=pos]),
        None => format!("{cut}..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn agape() -> StageResult {
        StageResult::success(
            StageId::Agape,
            object(json!({
                "loving_actions": ["Listen first", "Offer a fix"],
                "why_loving": "Meets the user where they are."
            })),
            10,
        )
    }

    fn thoth(verified: u64, unverified: u64) -> StageResult {
        StageResult::success(
            StageId::Thoth,
            object(json!({"verified_claims": verified, "unverified_claims": unverified})),
            5,
        )
    }

    #[test]
    fn test_default_response_when_nothing_contributes() {
        let synthesizer = ResponseSynthesizer::new(SynthesisConfig {
            include_truth_markers: false,
            ..SynthesisConfig::default()
        });
        assert_eq!(synthesizer.synthesize(&[]), DEFAULT_RESPONSE);
    }

    #[test]
    fn test_agape_section_layout() {
        let synthesizer = ResponseSynthesizer::default();
        let response = synthesizer.synthesize(&[agape(), thoth(2, 0)]);

        assert_eq!(
            response,
            "Here's what I can do to help RIGHT NOW:\n1. Listen first\n2. Offer a fix\n\nMeets the user where they are.\n\n*(All claims verified)*"
        );
    }

    #[test]
    fn test_eris_only_with_discord() {
        let synthesizer = ResponseSynthesizer::new(SynthesisConfig {
            include_truth_markers: false,
            ..SynthesisConfig::default()
        });
        let calm = StageResult::success(
            StageId::Eris,
            object(json!({"discord_detected": false, "root_cause": "none"})),
            0,
        );
        assert_eq!(synthesizer.synthesize(&[calm]), DEFAULT_RESPONSE);

        let discord = StageResult::success(
            StageId::Eris,
            object(json!({
                "discord_detected": true,
                "root_cause": "Missing constraints",
                "prevention_strategy": "Ask first"
            })),
            0,
        );
        assert_eq!(
            synthesizer.synthesize(&[discord]),
            "I see the issue: Missing constraints\nGoing forward: Ask first"
        );
    }

    #[test]
    fn test_humor_requires_detected_and_appropriate() {
        let synthesizer = ResponseSynthesizer::new(SynthesisConfig {
            include_truth_markers: false,
            ..SynthesisConfig::default()
        });
        let inappropriate = StageResult::success(
            StageId::ThaliaRose,
            object(json!({"humor_detected": true, "humor_appropriate": false, "humor_text": "ha"})),
            0,
        );
        assert_eq!(synthesizer.synthesize(&[inappropriate]), DEFAULT_RESPONSE);

        let funny = StageResult::success(
            StageId::ThaliaRose,
            object(json!({"humor_detected": true, "humor_appropriate": true, "humor_text": "ha"})),
            0,
        );
        assert_eq!(synthesizer.synthesize(&[funny.clone()]), "ha");

        let no_humor = ResponseSynthesizer::new(SynthesisConfig {
            include_humor: false,
            include_truth_markers: false,
            ..SynthesisConfig::default()
        });
        assert_eq!(no_humor.synthesize(&[funny]), DEFAULT_RESPONSE);
    }

    #[test]
    fn test_unverified_claims_marker() {
        let synthesizer = ResponseSynthesizer::default();
        let response = synthesizer.synthesize(&[agape(), thoth(1, 2)]);
        assert!(response.ends_with(
            "*(Note: Some claims are unverified or theoretical. Verified: 1, Unverified: 2)*"
        ));
    }

    #[test]
    fn test_provenance_note_for_fallback_and_missing_thoth() {
        let synthesizer = ResponseSynthesizer::default();
        let eris = StageResult::fallback(
            StageId::Eris,
            object(json!({"discord_detected": false})),
            "LLM client not provided",
        );
        let response = synthesizer.synthesize(&[agape(), eris]);

        assert!(response.ends_with(
            "*(Parts of this response are estimated (ERIS). Claims have not been verified.)*"
        ));
    }

    #[test]
    fn test_truncates_at_sentence_boundary() {
        let synthesizer = ResponseSynthesizer::new(SynthesisConfig {
            max_length: 20,
            include_truth_markers: false,
            ..SynthesisConfig::default()
        });
        let metis = StageResult::success(
            StageId::Metis,
            object(json!({"empathy_analysis": {"user_needs": "Short one. Then a much longer sentence"}})),
            0,
        );
        assert_eq!(synthesizer.synthesize(&[metis]), "Short one. (Response truncated)");
    }

    #[test]
    fn test_truncate_without_period_is_char_safe() {
        assert_eq!(truncate("héllo wörld", 7), "héllo w...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_concise_tone_single_breaks() {
        let synthesizer = ResponseSynthesizer::new(SynthesisConfig {
            tone: Tone::Concise,
            include_truth_markers: false,
            ..SynthesisConfig::default()
        });
        let metis = StageResult::success(
            StageId::Metis,
            object(json!({"empathy_analysis": {"user_needs": "Needs"}})),
            0,
        );
        let eris = StageResult::success(
            StageId::Eris,
            object(json!({"discord_detected": true, "root_cause": "Cause"})),
            0,
        );
        assert_eq!(
            synthesizer.synthesize(&[eris, metis]),
            "I see the issue: Cause\nNeeds"
        );
    }
}
