//! Extraction of the JSON object from free-form model output.

use serde_json::Value;

use crate::core::JsonObject;

/// Strips markdown fences and parses the first balanced `{...}` object.
///
/// Braces inside string literals are ignored when matching. Returns a
/// description of the problem when no object can be recovered.
pub fn extract_json_object(text: &str) -> Result<JsonObject, String> {
    let cleaned = strip_fences(text);
    let start = cleaned
        .find('{')
        .ok_or_else(|| format!("no JSON object in response: {}", preview(text)))?;
    let end = matching_brace(&cleaned[start..])
        .map(|offset| start + offset + 1)
        .ok_or_else(|| format!("unbalanced JSON object in response: {}", preview(text)))?;

    match serde_json::from_str::<Value>(&cleaned[start..end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("response JSON is not an object".to_string()),
        Err(e) => Err(format!("failed to parse response JSON: {e}")),
    }
}

fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Byte offset of the brace closing the object that starts at offset 0.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
