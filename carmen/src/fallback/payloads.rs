//! Per-stage fallback payloads.

use serde_json::{json, Value};

use super::heuristics::{
    assess_severity, contains_any, contributing_factors, detect_conflict, detect_discord,
    extract_keywords, extract_knowledge_gaps, extract_root_cause, identify_pattern,
    identify_root_cause, prevention_strategy, root_cause_type, stated_need, string_items,
};
use crate::core::JsonObject;

fn into_object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn str_field<'a>(output: Option<&'a JsonObject>, key: &str) -> Option<&'a str> {
    output.and_then(|output| output.get(key)).and_then(Value::as_str)
}

pub(super) fn agape(input: &str) -> JsonObject {
    into_object(json!({
        "loving_actions": [
            "Offer patient guidance based on detected needs",
            "Provide constructive support",
            "Acknowledge user's situation with empathy"
        ],
        "behavioral_scores": {
            "did_it_teach": false,
            "did_it_help": true,
            "did_it_encourage": true,
            "patience_shown": true,
            "kindness_shown": true,
            "hope_shown": false,
            "flexibility_shown": true
        },
        "love_score": 0.6,
        "why_loving": "Default loving action: Offering support and guidance based on available context.",
        "extracted_keywords": extract_keywords(input),
        "used_fallback": true
    }))
}

pub(super) fn eris(input: &str, agape: Option<&JsonObject>) -> JsonObject {
    let cause_type = root_cause_type(input);
    into_object(json!({
        "discord_detected": detect_discord(input, agape),
        "root_cause": identify_root_cause(input, agape),
        "root_cause_type": cause_type,
        "severity": assess_severity(input),
        "contributing_factors": contributing_factors(input, agape),
        "pattern_identified": identify_pattern(input),
        "prevention_strategy": prevention_strategy(cause_type),
        "root_causes": [{
            "cause": extract_root_cause(input),
            "severity": "medium",
            "confidence": 0.5,
            "why": "Identified from message analysis (fallback mode)"
        }],
        "conflict_detected": detect_conflict(input),
        "conflict_score": 0.5,
        "analysis_method": "keyword_extraction",
        "used_fallback": true
    }))
}

pub(super) fn metis(input: &str, eris: Option<&JsonObject>, agape: Option<&JsonObject>) -> JsonObject {
    into_object(json!({
        "ideal_state": ideal_state(input, eris),
        "current_state": current_state(input, eris),
        "gap_identified": gaps(eris, agape),
        "empathy_analysis": empathy(input, eris, agape),
        "understanding_score": understanding_score(eris, agape),
        "knowledge_gaps": extract_knowledge_gaps(input),
        "empathy_score": 0.65,
        "used_fallback": true
    }))
}

pub(super) fn thalia_rose() -> JsonObject {
    into_object(json!({
        "humor_detected": false,
        "humor_appropriate": false,
        "humor_score": 0.0,
        "cultural_context": "neutral",
        "reason": "Humor analysis requires full context - skipped in fallback mode",
        "used_fallback": true
    }))
}

pub(super) fn thoth() -> JsonObject {
    into_object(json!({
        "verified_claims": 0,
        "unverified_claims": 0,
        "verification_score": 0.5,
        "truth_status": "unverified",
        "reason": "Truth verification requires full analysis - skipped in fallback mode",
        "used_fallback": true
    }))
}

fn ideal_state(input: &str, eris: Option<&JsonObject>) -> &'static str {
    if let Some(cause) = str_field(eris, "root_cause") {
        if contains_any(cause, &["knowledge"]) {
            return "Ideal: System has complete knowledge before making suggestions";
        }
        if contains_any(cause, &["constraint"]) {
            return "Ideal: Constraints identified and respected before proposing solutions";
        }
        if contains_any(cause, &["communication"]) {
            return "Ideal: Clear communication with mutual understanding";
        }
    }
    if contains_any(input, &["should", "expected", "supposed to", "ought to", "want"]) {
        "Ideal: User expectations met with appropriate solutions"
    } else {
        "Ideal: Situation resolved with user's needs met"
    }
}

fn current_state(input: &str, eris: Option<&JsonObject>) -> String {
    if let Some(cause) = str_field(eris, "root_cause") {
        format!("Current: {cause}")
    } else if contains_any(input, &["frustrat", "angry", "upset", "problem", "issue"]) {
        "Current: User experiencing frustration or dissatisfaction".to_string()
    } else {
        "Current: Situation as described by user in message".to_string()
    }
}

fn gaps(eris: Option<&JsonObject>, agape: Option<&JsonObject>) -> Value {
    let mut knowledge = None;
    let mut communication = None;
    let mut solution = None;

    if let Some(kind) = str_field(eris, "root_cause_type") {
        let cause = str_field(eris, "root_cause").map(str::to_string);
        match kind {
            "knowledge_gap" => {
                knowledge = cause.or_else(|| Some("Missing information or understanding".to_string()));
            }
            "communication" | "misunderstanding" => {
                communication =
                    cause.or_else(|| Some("Communication or interpretation failure".to_string()));
            }
            "constraint" => {
                solution = cause.or_else(|| Some("Solution doesn't fit constraints".to_string()));
            }
            _ => {}
        }
    }

    for action in string_items(agape, "loving_actions") {
        if solution.is_none() && contains_any(action, &["constraint"]) {
            solution = Some(format!("Solution doesn't account for constraints: {action}"));
        }
        if knowledge.is_none() && contains_any(action, &["understand"]) {
            knowledge = Some(format!("Missing understanding: {action}"));
        }
    }

    json!({
        "knowledge_gap": knowledge
            .unwrap_or_else(|| "Potential knowledge gap requiring investigation".to_string()),
        "communication_gap": communication
            .unwrap_or_else(|| "Potential communication gap requiring clarification".to_string()),
        "solution_gap": solution
            .unwrap_or_else(|| "Potential mismatch between solution and actual needs".to_string()),
    })
}

fn empathy(input: &str, eris: Option<&JsonObject>, agape: Option<&JsonObject>) -> Value {
    let experience = if contains_any(input, &["frustrat"]) {
        "User experiencing frustration"
    } else if contains_any(input, &["angry", "mad"]) {
        "User experiencing anger or irritation"
    } else if contains_any(input, &["confus"]) {
        "User experiencing confusion"
    } else {
        "User experiencing dissatisfaction or unmet needs"
    };

    let why = str_field(eris, "root_cause").map_or_else(
        || "Due to gap between expectation and reality".to_string(),
        |cause| format!("Because: {cause}"),
    );

    let needs = if contains_any(input, &["need", "want", "require"]) {
        stated_need(input).unwrap_or_else(|| "Solution that works within their constraints".to_string())
    } else {
        "Solution that addresses root cause and fits their situation".to_string()
    };

    let actions: Vec<&str> = string_items(agape, "loving_actions").take(2).collect();
    let bridge = if let Some(strategy) = str_field(eris, "prevention_strategy") {
        strategy.to_string()
    } else if !actions.is_empty() {
        format!("Bridge: {}", actions.join(", "))
    } else {
        "Bridge: Address root cause and provide working solution within constraints".to_string()
    };

    json!({
        "user_experience": experience,
        "why_experiencing": why,
        "user_needs": needs,
        "bridge": bridge,
    })
}

fn understanding_score(eris: Option<&JsonObject>, agape: Option<&JsonObject>) -> f64 {
    let mut score = 0.5;
    if str_field(eris, "root_cause").is_some() {
        score += 0.2;
    }
    if let Some(love) = agape.and_then(|output| output.get("love_score")).and_then(Value::as_f64) {
        score += (love * 0.2).min(0.2);
    }
    if eris.is_some() && agape.is_some() {
        score += 0.1;
    }
    (score.min(1.0) * 100.0).round() / 100.0
}
