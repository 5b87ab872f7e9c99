//! Keyword and pattern heuristics over raw input text.
//!
//! Everything here is a pure function of its arguments. Matching is
//! case-insensitive substring or regex matching, no scoring models.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::core::JsonObject;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "must", "can", "this", "that", "these", "those", "i",
    "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
];

const MAX_KEYWORDS: usize = 10;

const CONFLICT_KEYWORDS: &[&str] = &[
    "frustrat", "angry", "mad", "upset", "problem", "issue", "error", "wrong", "failed", "broken",
    "can't", "cannot",
];

const DISCORD_KEYWORDS: &[&str] = &[
    "frustrat", "angry", "mad", "upset", "problem", "issue", "error", "wrong", "failed", "broken",
    "can't", "cannot", "hate", "disappointed",
];

const POSITIVE_WORDS: &[&str] = &[
    "happy", "glad", "thanks", "great", "good", "excellent", "love", "appreciate",
];

const NEGATIVE_WORDS: &[&str] = &[
    "frustrat", "angry", "mad", "upset", "hate", "terrible", "awful", "bad",
];

/// Crude tri-state sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    /// More positive than negative markers.
    Positive,
    /// More negative than positive markers.
    Negative,
    /// Balanced or no markers.
    Neutral,
}

/// Context extracted from the raw message alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicContext {
    /// Up to ten distinct non-stop-words longer than three characters.
    pub keywords: Vec<String>,
    /// Whether the message contains a question mark.
    pub has_question: bool,
    /// Whether the message contains conflict indicators.
    pub has_conflict: bool,
    /// Estimated sentiment.
    pub estimated_sentiment: Sentiment,
    /// Message length in bytes.
    pub message_length: usize,
    /// Number of words.
    pub word_count: usize,
}

impl BasicContext {
    /// Extracts the context from `message`.
    #[must_use]
    pub fn extract(message: &str) -> Self {
        Self {
            keywords: extract_keywords(message),
            has_question: message.contains('?'),
            has_conflict: detect_conflict(message),
            estimated_sentiment: estimate_sentiment(message),
            message_length: message.len(),
            word_count: words(message).count(),
        }
    }

    /// Returns the context as a JSON object.
    #[must_use]
    pub fn to_object(&self) -> JsonObject {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => JsonObject::new(),
        }
    }
}

/// Splits text into words made of letters, apostrophes and hyphens.
fn words(message: &str) -> impl Iterator<Item = &str> {
    message
        .split(|c: char| !(c.is_ascii_alphabetic() || c == '\'' || c == '-'))
        .filter(|word| word.chars().any(|c| c.is_ascii_alphabetic()))
}

/// Case-insensitive substring test against a keyword list.
pub(crate) fn contains_any(message: &str, keywords: &[&str]) -> bool {
    let lower = message.to_lowercase();
    keywords.iter().any(|keyword| lower.contains(keyword))
}

fn count_matches(lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|keyword| lower.contains(*keyword)).count()
}

/// Compiles a case-insensitive pattern table once.
fn pattern_table(
    cell: &'static OnceLock<Vec<(Regex, &'static str)>>,
    patterns: &[(&str, &'static str)],
) -> &'static [(Regex, &'static str)] {
    cell.get_or_init(|| {
        patterns
            .iter()
            .filter_map(|(pattern, label)| {
                Regex::new(&format!("(?i){pattern}")).ok().map(|re| (re, *label))
            })
            .collect()
    })
}

fn first_match(table: &[(Regex, &'static str)], message: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(re, _)| re.is_match(message))
        .map(|(_, label)| *label)
}

fn single_pattern(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Lower-cased keywords: longer than three characters, not stop words,
/// taken from the first ten candidates and deduplicated in order.
#[must_use]
pub fn extract_keywords(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    for word in words(&lower)
        .filter(|word| word.len() > 3 && !STOP_WORDS.contains(word))
        .take(MAX_KEYWORDS)
    {
        if !keywords.iter().any(|existing| existing == word) {
            keywords.push(word.to_string());
        }
    }
    keywords
}

/// Whether the message carries conflict indicators.
#[must_use]
pub fn detect_conflict(message: &str) -> bool {
    contains_any(message, CONFLICT_KEYWORDS)
}

/// Positive vs negative keyword count.
#[must_use]
pub fn estimate_sentiment(message: &str) -> Sentiment {
    let lower = message.to_lowercase();
    let positive = count_matches(&lower, POSITIVE_WORDS);
    let negative = count_matches(&lower, NEGATIVE_WORDS);
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// One-line root cause guessed from conflict patterns.
#[must_use]
pub fn extract_root_cause(message: &str) -> &'static str {
    static TABLE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let table = pattern_table(
        &TABLE,
        &[
            (r"frustrat(ed|ing|ion)", "Frustration with current approach or limitations"),
            (r"angry|mad|upset", "Emotional distress or dissatisfaction"),
            (r"confus(ed|ing|ion)", "Lack of clarity or understanding"),
            (r"problem|issue|error", "Technical or practical problem"),
            (r"can't|cannot|unable", "Capability or resource constraint"),
            (r"wrong|incorrect|mistake", "Perceived error or misunderstanding"),
            (r"not working|broken|failed", "System or process failure"),
        ],
    );
    first_match(table, message)
        .unwrap_or("Potential misunderstanding in communication or expectation mismatch")
}

/// Knowledge gaps signalled by questions, uncertainty or expectations.
#[must_use]
pub fn extract_knowledge_gaps(message: &str) -> Vec<String> {
    static UNCERTAIN: OnceLock<Option<Regex>> = OnceLock::new();
    static EXPECTED: OnceLock<Option<Regex>> = OnceLock::new();

    let mut gaps = Vec::new();
    if message.contains('?') {
        gaps.push("User seeking clarification or information".to_string());
    }
    if single_pattern(&UNCERTAIN, r"(?i)don'?t know|not sure|unclear|confus")
        .is_some_and(|re| re.is_match(message))
    {
        gaps.push("Missing information or understanding".to_string());
    }
    if single_pattern(&EXPECTED, r"(?i)should|expected|supposed to|ought to")
        .is_some_and(|re| re.is_match(message))
    {
        gaps.push("Gap between expectation and current reality".to_string());
    }
    if gaps.is_empty() {
        gaps.push("Potential gap in understanding or information".to_string());
    }
    gaps
}

/// Whether the message (or a low AGAPE love score) signals discord.
#[must_use]
pub fn detect_discord(message: &str, agape: Option<&JsonObject>) -> bool {
    if contains_any(message, DISCORD_KEYWORDS) {
        return true;
    }
    agape
        .and_then(|output| output.get("love_score"))
        .and_then(Value::as_f64)
        .is_some_and(|score| score < 0.5)
}

/// Root cause sentence for the discord analysis.
#[must_use]
pub fn identify_root_cause(message: &str, agape: Option<&JsonObject>) -> String {
    static TABLE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let table = pattern_table(
        &TABLE,
        &[
            (r"don'?t know|not sure|unclear|confus", "Knowledge gap: Missing information or understanding"),
            (r"should|expected|supposed to|ought to", "Expectation mismatch: Gap between expectation and reality"),
            (r"can'?t|cannot|unable|no way", "Environmental constraint: Resource or capability limitation"),
            (r"misunderstand|confus|unclear|ambiguous", "Misunderstanding: Communication or interpretation failure"),
            (r"error|wrong|incorrect|mistake", "Knowledge gap: Incorrect information or assumption"),
            (r"frustrat|angry|upset", "Communication failure: Message not received or understood correctly"),
        ],
    );
    if let Some(cause) = first_match(table, message) {
        return cause.to_string();
    }
    if let Some(why) = agape.and_then(|output| output.get("why_loving")).and_then(Value::as_str) {
        return format!("Potential root cause identified from context: {why}");
    }
    "Potential misunderstanding in communication or expectation mismatch".to_string()
}

/// Root cause category.
#[must_use]
pub fn root_cause_type(message: &str) -> &'static str {
    const TYPES: &[(&str, &[&str])] = &[
        ("knowledge_gap", &["don't know", "not sure", "unclear", "missing", "unaware"]),
        ("misunderstanding", &["misunderstand", "confus", "unclear", "ambiguous", "interpret"]),
        ("ambiguity", &["unclear", "ambiguous", "vague", "unsure", "confus"]),
        ("constraint", &["can't", "cannot", "unable", "no way", "limited", "budget", "constraint"]),
        ("communication", &["frustrat", "angry", "upset", "not understand", "message"]),
    ];
    TYPES
        .iter()
        .find(|(_, keywords)| contains_any(message, keywords))
        .map_or("knowledge_gap", |(kind, _)| *kind)
}

/// Severity from the strongest keyword present.
#[must_use]
pub fn assess_severity(message: &str) -> &'static str {
    if contains_any(message, &["hate", "terrible", "awful", "disaster", "broken", "failed"]) {
        "critical"
    } else if contains_any(message, &["angry", "frustrat", "upset", "wrong", "error"]) {
        "high"
    } else if contains_any(message, &["problem", "issue", "concern", "worry"]) {
        "medium"
    } else {
        "low"
    }
}

/// Up to three contributing constraints.
#[must_use]
pub fn contributing_factors(message: &str, agape: Option<&JsonObject>) -> Vec<String> {
    static TABLE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let table = pattern_table(
        &TABLE,
        &[
            (r"\$\d+|budget|cost|price|expensive|cheap", "Financial constraint"),
            (r"time|deadline|urgent|quick", "Time constraint"),
            (r"hosting|server|infrastructure|platform", "Technical constraint"),
        ],
    );

    let mut factors: Vec<String> = table
        .iter()
        .filter(|(re, _)| re.is_match(message))
        .map(|(_, label)| (*label).to_string())
        .collect();

    for action in string_items(agape, "loving_actions") {
        if contains_any(action, &["constraint", "limit"]) {
            factors.push(format!("Constraint identified: {action}"));
        }
    }

    factors.truncate(3);
    factors
}

/// Recurring-pattern label.
#[must_use]
pub fn identify_pattern(message: &str) -> &'static str {
    if contains_any(message, &["always", "never", "every time", "constantly"]) {
        "Recurring issue pattern detected"
    } else if contains_any(message, &["again", "still", "yet"]) {
        "Persistent issue pattern"
    } else {
        "No clear recurring pattern identified"
    }
}

/// Prevention strategy for a root cause category.
#[must_use]
pub fn prevention_strategy(root_cause_type: &str) -> &'static str {
    match root_cause_type {
        "knowledge_gap" => "Provide clear documentation and context before making suggestions",
        "misunderstanding" => "Clarify expectations and confirm understanding before proceeding",
        "ambiguity" => "Ask clarifying questions to resolve ambiguity early",
        "constraint" => "Identify constraints and limitations before proposing solutions",
        "communication" => "Improve communication channels and feedback loops",
        _ => "Address root cause proactively to prevent recurrence",
    }
}

/// The user need stated after "need", "want" or "require", if any.
#[must_use]
pub fn stated_need(message: &str) -> Option<String> {
    static NEED: OnceLock<Option<Regex>> = OnceLock::new();
    let re = single_pattern(&NEED, r"(?i)(?:need|want|require)\s+(?:(?:a|an|the|to)\s+)?([^.!?]+)")?;
    re.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|need| !need.is_empty())
}

/// Iterates the string items of an array field.
pub(crate) fn string_items<'a>(output: Option<&'a JsonObject>, key: &str) -> impl Iterator<Item = &'a str> {
    output
        .and_then(|output| output.get(key))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Compact JSON when short enough, otherwise a key-field summary.
#[must_use]
pub fn summarize_stage_output(output: &JsonObject, max_len: usize) -> String {
    let compact = serde_json::to_string(output).unwrap_or_default();
    if compact.len() <= max_len {
        return compact;
    }

    let mut fields = Vec::new();
    let actions: Vec<&str> = string_items(Some(output), "loving_actions").take(2).collect();
    if !actions.is_empty() {
        fields.push(format!("Actions: {}", actions.join(", ")));
    }
    if let Some(cause) = output.get("root_cause").and_then(Value::as_str) {
        fields.push(format!("Root cause: {cause}"));
    } else if let Some(cause) = output
        .get("root_causes")
        .and_then(Value::as_array)
        .and_then(|causes| causes.first())
        .and_then(|cause| cause.get("cause"))
        .and_then(Value::as_str)
    {
        fields.push(format!("Root causes: {cause}"));
    }
    if let Some(gap) = string_items(Some(output), "knowledge_gaps").next() {
        fields.push(format!("Gaps: {gap}"));
    }

    if fields.is_empty() {
        let mut cut: String = compact.chars().take(max_len).collect();
        cut.push_str("...");
        cut
    } else {
        fields.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_keywords_filter_and_dedupe() {
        let keywords = extract_keywords("I'm frustrated with this. Frustrated and tired of waiting!");
        assert_eq!(keywords, vec!["frustrated", "tired", "waiting"]);
    }

    #[test]
    fn test_keywords_limited_to_first_ten_candidates() {
        let message = "alpha bravo charlie delta echoes foxtrot golfs hotel india juliet kilos limas";
        let keywords = extract_keywords(message);
        assert_eq!(keywords.len(), 10);
        assert_eq!(keywords.last().map(String::as_str), Some("juliet"));
    }

    #[test]
    fn test_basic_context() {
        let context = BasicContext::extract("Why is my build broken again?");
        assert!(context.has_question);
        assert!(context.has_conflict);
        assert_eq!(context.estimated_sentiment, Sentiment::Neutral);
        assert_eq!(context.word_count, 6);
        assert_eq!(context.message_length, 29);
        assert_eq!(context.to_object()["estimated_sentiment"], json!("neutral"));
    }

    #[test]
    fn test_sentiment() {
        assert_eq!(estimate_sentiment("Thanks, this is great"), Sentiment::Positive);
        assert_eq!(estimate_sentiment("I hate this awful thing"), Sentiment::Negative);
        assert_eq!(estimate_sentiment("The sky is blue"), Sentiment::Neutral);
    }

    #[test]
    fn test_root_cause_patterns() {
        assert_eq!(
            extract_root_cause("I'm frustrated with this."),
            "Frustration with current approach or limitations"
        );
        assert_eq!(
            extract_root_cause("hello there"),
            "Potential misunderstanding in communication or expectation mismatch"
        );
    }

    #[test]
    fn test_knowledge_gaps() {
        assert_eq!(
            extract_knowledge_gaps("It should work, right?"),
            vec![
                "User seeking clarification or information".to_string(),
                "Gap between expectation and current reality".to_string(),
            ]
        );
        assert_eq!(extract_knowledge_gaps("ok").len(), 1);
    }

    #[test]
    fn test_discord_from_love_score() {
        let agape = json!({"love_score": 0.3}).as_object().cloned().unwrap();
        assert!(detect_discord("hello", Some(&agape)));
        assert!(!detect_discord("hello", None));
        assert!(detect_discord("I'm disappointed", None));
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(assess_severity("everything failed"), "critical");
        assert_eq!(assess_severity("I'm frustrated"), "high");
        assert_eq!(assess_severity("small issue here"), "medium");
        assert_eq!(assess_severity("hello"), "low");
    }

    #[test]
    fn test_contributing_factors_capped() {
        let agape = json!({"loving_actions": ["Respect the budget limit", "Work within constraints"]})
            .as_object()
            .cloned()
            .unwrap();
        let factors = contributing_factors("Our $50 hosting deadline", Some(&agape));
        assert_eq!(
            factors,
            vec!["Financial constraint", "Time constraint", "Technical constraint"]
        );
    }

    #[test]
    fn test_root_cause_type_and_strategy() {
        assert_eq!(root_cause_type("I can't afford it"), "constraint");
        assert_eq!(root_cause_type("I'm frustrated"), "communication");
        assert_eq!(root_cause_type("hello"), "knowledge_gap");
        assert_eq!(
            prevention_strategy("constraint"),
            "Identify constraints and limitations before proposing solutions"
        );
    }

    #[test]
    fn test_stated_need() {
        assert_eq!(stated_need("I need a cheaper host. Thanks"), Some("cheaper host".to_string()));
        assert_eq!(stated_need("hello"), None);
    }

    #[test]
    fn test_summarize_short_output_is_json() {
        let output = json!({"a": 1}).as_object().cloned().unwrap();
        assert_eq!(summarize_stage_output(&output, 200), r#"{"a":1}"#);
    }

    #[test]
    fn test_summarize_long_output_uses_key_fields() {
        let output = json!({
            "loving_actions": ["First action", "Second action", "Third action"],
            "knowledge_gaps": ["Missing information or understanding"],
            "padding": "x".repeat(300)
        })
        .as_object()
        .cloned()
        .unwrap();
        assert_eq!(
            summarize_stage_output(&output, 100),
            "Actions: First action, Second action | Gaps: Missing information or understanding"
        );
    }
}
