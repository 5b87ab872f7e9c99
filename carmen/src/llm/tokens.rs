//! Local token estimation.

/// Approximate characters per token.
const CHARS_PER_TOKEN: usize = 4;

/// Estimates the token count of `text` as `ceil(chars / 4)`.
///
/// Only for local budgeting; never authoritative.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN) as u64
}
