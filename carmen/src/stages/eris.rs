//! ERIS: root causes of discord.

use serde_json::{json, Value};

use super::schema::{
    option_str, option_u64, require_bool, require_one_of, require_str, truncate_array,
};
use crate::core::{JsonObject, StageId};

const STAGE: StageId = StageId::Eris;

/// Accepted `root_cause_type` values.
pub const ROOT_CAUSE_TYPES: [&str; 5] = [
    "knowledge_gap",
    "misunderstanding",
    "ambiguity",
    "constraint",
    "communication",
];

/// Accepted `severity` values, most severe first.
pub const SEVERITIES: [&str; 4] = ["critical", "high", "medium", "low"];

pub(super) fn default_options() -> JsonObject {
    let mut options = JsonObject::new();
    options.insert("max_root_causes".to_string(), json!(2));
    options.insert("severity_threshold".to_string(), json!("medium"));
    options
}

pub(super) fn validate_options(options: &JsonObject) -> Result<(), String> {
    if !option_u64(options, "max_root_causes").is_some_and(|max| max >= 1) {
        return Err("max_root_causes must be >= 1".to_string());
    }
    match option_str(options, "severity_threshold") {
        Some(threshold) if SEVERITIES.contains(&threshold) => Ok(()),
        _ => Err(format!(
            "severity_threshold must be one of: {}",
            SEVERITIES.join(", ")
        )),
    }
}

pub(super) fn system_prompt(options: &JsonObject) -> String {
    let max_causes = option_u64(options, "max_root_causes").unwrap_or(2);
    let threshold = option_str(options, "severity_threshold").unwrap_or("medium");
    format!(
        r#"You are the ERIS stage of CARMEN (Unified Emotional Intelligence Agent).

Your role: Find ROOT CAUSES of conflicts, discord, frustration.

CRITICAL: Not "you're angry" but "THIS is causing the anger."

Look for:
- Knowledge gaps (what's missing?)
- Misunderstandings (what's confused?)
- Ambiguity (what's unclear?)
- Environmental constraints (what limitation?)
- Communication failures (where did message fail?)

Report at most {max_causes} contributing factors at or above {threshold} severity.

Return ONLY valid JSON matching this exact schema (no markdown, no code blocks, just pure JSON):

{{
  "discord_detected": true,
  "root_cause": "What is ACTUALLY causing the problem",
  "root_cause_type": "knowledge_gap",
  "severity": "medium",
  "contributing_factors": ["factor1", "factor2"],
  "pattern_identified": "Recurring pattern (if any)",
  "prevention_strategy": "How to prevent this in the future"
}}"#
    )
}

pub(super) fn validate(output: &mut JsonObject, options: &JsonObject) -> Result<(), String> {
    require_bool(output, "discord_detected", STAGE)?;
    require_str(output, "root_cause", STAGE)?;
    require_one_of(output, "root_cause_type", &ROOT_CAUSE_TYPES, STAGE)?;
    require_one_of(output, "severity", &SEVERITIES, STAGE)?;

    if !output
        .get("contributing_factors")
        .map_or(true, Value::is_array)
    {
        output.insert("contributing_factors".to_string(), json!([]));
    }
    truncate_array(output, "contributing_factors", option_u64(options, "max_root_causes"));
    truncate_array(output, "root_causes", option_u64(options, "max_root_causes"));
    Ok(())
}
