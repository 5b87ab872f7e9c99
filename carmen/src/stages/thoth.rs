//! THOTH: verification of factual claims.

use super::schema::{require, require_one_of, require_score};
use crate::core::{JsonObject, StageId};

const STAGE: StageId = StageId::Thoth;

/// Accepted `truth_status` values.
pub const TRUTH_STATUSES: [&str; 4] = ["verified", "partially_verified", "unverified", "disputed"];

pub(super) fn system_prompt() -> String {
    r#"You are the THOTH stage of CARMEN (Unified Emotional Intelligence Agent).

Your role: Count the factual claims in the conversation and judge which can be verified.

Do not invent sources. A claim you cannot check is unverified.

Return ONLY valid JSON matching this exact schema (no markdown, no code blocks, just pure JSON):

{
  "verified_claims": 0,
  "unverified_claims": 0,
  "verification_score": 0.5,
  "truth_status": "unverified"
}"#
    .to_string()
}

pub(super) fn validate(output: &mut JsonObject) -> Result<(), String> {
    for field in ["verified_claims", "unverified_claims"] {
        if require(output, field, STAGE)?.as_u64().is_none() {
            return Err(format!("{field} must be a non-negative integer"));
        }
    }
    require_score(output, "verification_score", STAGE)?;
    require_one_of(output, "truth_status", &TRUTH_STATUSES, STAGE)
}
