//! THALIA_ROSE: whether humor is present and appropriate.

use serde_json::Value;

use super::schema::{require_bool, require_score, require_str};
use crate::core::{JsonObject, StageId};

const STAGE: StageId = StageId::ThaliaRose;

pub(super) fn system_prompt() -> String {
    r#"You are the THALIA_ROSE stage of CARMEN (Unified Emotional Intelligence Agent).

Your role: Judge whether light humor would help, and offer it only when it is kind.

Never joke about loss, danger or anything the user is struggling with.

Return ONLY valid JSON matching this exact schema (no markdown, no code blocks, just pure JSON):

{
  "humor_detected": false,
  "humor_appropriate": false,
  "humor_score": 0.0,
  "cultural_context": "neutral",
  "humor_text": "A short, kind line of humor (empty if none)",
  "why_funny": "Why it lands (empty if none)"
}"#
    .to_string()
}

pub(super) fn validate(output: &mut JsonObject) -> Result<(), String> {
    require_bool(output, "humor_detected", STAGE)?;
    require_bool(output, "humor_appropriate", STAGE)?;
    require_score(output, "humor_score", STAGE)?;
    require_str(output, "cultural_context", STAGE)?;
    if !output.get("humor_text").is_some_and(Value::is_string) {
        output.insert("humor_text".to_string(), Value::String(String::new()));
    }
    Ok(())
}
