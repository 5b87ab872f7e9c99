//! AGAPE: loving actions that help the user now.

use serde_json::json;

use super::schema::{option_u64, require, require_score, require_str, truncate_array};
use crate::core::{JsonObject, StageId};

const STAGE: StageId = StageId::Agape;

pub(super) fn default_options() -> JsonObject {
    let mut options = JsonObject::new();
    options.insert("max_actions".to_string(), json!(3));
    options.insert("behavioral_threshold".to_string(), json!(0.7));
    options
}

pub(super) fn validate_options(options: &JsonObject) -> Result<(), String> {
    if !option_u64(options, "max_actions").is_some_and(|max| max >= 1) {
        return Err("max_actions must be >= 1".to_string());
    }
    match options.get("behavioral_threshold").and_then(serde_json::Value::as_f64) {
        Some(threshold) if (0.0..=1.0).contains(&threshold) => Ok(()),
        _ => Err("behavioral_threshold must be 0-1".to_string()),
    }
}

pub(super) fn system_prompt(options: &JsonObject) -> String {
    let max_actions = option_u64(options, "max_actions").unwrap_or(3);
    format!(
        r#"You are the AGAPE stage of CARMEN (Unified Emotional Intelligence Agent).

Your role: Identify LOVING ACTIONS that help the user RIGHT NOW.

Love is patient, kind, hopeful and flexible. It teaches without condemning and works WITH constraints, not against them.

List at most {max_actions} concrete actions.

Return ONLY valid JSON matching this exact schema (no markdown, no code blocks, just pure JSON):

{{
  "loving_actions": ["action1", "action2"],
  "behavioral_scores": {{
    "did_it_teach": true,
    "did_it_help": true,
    "did_it_encourage": true,
    "patience_shown": true,
    "kindness_shown": true,
    "hope_shown": true,
    "flexibility_shown": true
  }},
  "love_score": 0.9,
  "why_loving": "Why these actions are loving"
}}"#
    )
}

pub(super) fn validate(output: &mut JsonObject, options: &JsonObject) -> Result<(), String> {
    let actions = require(output, "loving_actions", STAGE)?;
    let all_strings = actions
        .as_array()
        .is_some_and(|items| !items.is_empty() && items.iter().all(serde_json::Value::is_string));
    if !all_strings {
        return Err("loving_actions must be a non-empty array of strings".to_string());
    }
    if !require(output, "behavioral_scores", STAGE)?.is_object() {
        return Err("behavioral_scores must be an object".to_string());
    }
    require_score(output, "love_score", STAGE)?;
    require_str(output, "why_loving", STAGE)?;

    truncate_array(output, "loving_actions", option_u64(options, "max_actions"));
    Ok(())
}
