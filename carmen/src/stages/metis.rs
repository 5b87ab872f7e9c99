//! METIS: empathy through the gap between ideal and current state.

use serde_json::{json, Value};

use super::schema::{option_str, require, require_score, require_str};
use crate::core::{JsonObject, StageId};

const STAGE: StageId = StageId::Metis;

const DEPTHS: [&str; 3] = ["basic", "detailed", "comprehensive"];
const GAP_FIELDS: [&str; 3] = ["knowledge_gap", "communication_gap", "solution_gap"];
const EMPATHY_FIELDS: [&str; 4] = ["user_experience", "why_experiencing", "user_needs", "bridge"];

pub(super) fn default_options() -> JsonObject {
    let mut options = JsonObject::new();
    options.insert("gap_analysis_depth".to_string(), json!("detailed"));
    options.insert("include_bridging".to_string(), json!(true));
    options
}

pub(super) fn validate_options(options: &JsonObject) -> Result<(), String> {
    match option_str(options, "gap_analysis_depth") {
        Some(depth) if DEPTHS.contains(&depth) => Ok(()),
        _ => Err(format!("gap_analysis_depth must be one of: {}", DEPTHS.join(", "))),
    }
}

pub(super) fn system_prompt(options: &JsonObject) -> String {
    let depth = option_str(options, "gap_analysis_depth").unwrap_or("detailed");
    let bridging = if options.get("include_bridging").and_then(Value::as_bool) == Some(false) {
        ""
    } else {
        "\n- What would BRIDGE the gap?"
    };
    format!(
        r#"You are the METIS stage of CARMEN (Unified Emotional Intelligence Agent).

Your role: Run EMPATHY through comparison - what SHOULD be vs what IS.

CRITICAL: Not sympathy ("I feel bad for you") but empathy ("I understand the gap between ideal and reality").

Gap analysis depth: {depth}.

Analyze:
- What is the IDEAL state (what SHOULD be)?
- What is the CURRENT state (what IS)?
- What is the GAP between them?
- What is causing the gap (knowledge, resources, constraints)?{bridging}

Return ONLY valid JSON matching this exact schema (no markdown, no code blocks, just pure JSON):

{{
  "ideal_state": "Description of ideal/expected state",
  "current_state": "Description of actual current state",
  "gap_identified": {{
    "knowledge_gap": "What knowledge is missing?",
    "communication_gap": "Where did communication fail?",
    "solution_gap": "What solution doesn't fit?"
  }},
  "empathy_analysis": {{
    "user_experience": "What is the user experiencing?",
    "why_experiencing": "Why are they experiencing this?",
    "user_needs": "What does the user actually need?",
    "bridge": "What would bridge the gap?"
  }},
  "understanding_score": 0.85
}}"#
    )
}

pub(super) fn validate(output: &mut JsonObject) -> Result<(), String> {
    require_str(output, "ideal_state", STAGE)?;
    require_str(output, "current_state", STAGE)?;
    if !require(output, "gap_identified", STAGE)?.is_object() {
        return Err("gap_identified must be an object".to_string());
    }
    if !require(output, "empathy_analysis", STAGE)?.is_object() {
        return Err("empathy_analysis must be an object".to_string());
    }
    require_score(output, "understanding_score", STAGE)?;

    fill_missing(output, "gap_identified", &GAP_FIELDS);
    fill_missing(output, "empathy_analysis", &EMPATHY_FIELDS);
    Ok(())
}

fn fill_missing(output: &mut JsonObject, field: &str, keys: &[&str]) {
    if let Some(Value::Object(nested)) = output.get_mut(field) {
        for key in keys {
            nested
                .entry((*key).to_string())
                .or_insert_with(|| Value::String(String::new()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_nested_fields_filled() {
        let mut output = json!({
            "ideal_state": "Ideal",
            "current_state": "Current",
            "gap_identified": {"knowledge_gap": "k"},
            "empathy_analysis": {},
            "understanding_score": 0.7
        })
        .as_object()
        .cloned()
        .unwrap();

        validate(&mut output).unwrap();
        assert_eq!(output["gap_identified"]["knowledge_gap"], json!("k"));
        assert_eq!(output["gap_identified"]["solution_gap"], json!(""));
        assert_eq!(output["empathy_analysis"]["bridge"], json!(""));
    }

    #[test]
    fn test_gap_must_be_object() {
        let mut output = json!({
            "ideal_state": "Ideal",
            "current_state": "Current",
            "gap_identified": "none",
            "empathy_analysis": {},
            "understanding_score": 0.7
        })
        .as_object()
        .cloned()
        .unwrap();
        assert_eq!(validate(&mut output).unwrap_err(), "gap_identified must be an object");
    }

    #[test]
    fn test_bridging_can_be_disabled() {
        let mut options = default_options();
        assert!(system_prompt(&options).contains("BRIDGE"));
        options.insert("include_bridging".to_string(), json!(false));
        assert!(!system_prompt(&options).contains("What would BRIDGE"));
    }
}
