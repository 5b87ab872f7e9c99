//! Output schemas, prompts and option defaults for the five stages.

use serde_json::Value;

use super::{agape, eris, metis, thalia_rose, thoth};
use crate::core::{JsonObject, StageId};
use crate::errors::{ContractSuggestions, PipelineValidationError};

/// System prompt for `stage`, with its effective options applied.
#[must_use]
pub fn system_prompt(stage: StageId, options: &JsonObject) -> String {
    match stage {
        StageId::Agape => agape::system_prompt(options),
        StageId::Eris => eris::system_prompt(options),
        StageId::Metis => metis::system_prompt(options),
        StageId::ThaliaRose => thalia_rose::system_prompt(),
        StageId::Thoth => thoth::system_prompt(),
    }
}

/// Validates and normalises a live output in place.
pub fn validate_output(stage: StageId, output: &mut JsonObject, options: &JsonObject) -> Result<(), String> {
    match stage {
        StageId::Agape => agape::validate(output, options),
        StageId::Eris => eris::validate(output, options),
        StageId::Metis => metis::validate(output),
        StageId::ThaliaRose => thalia_rose::validate(output),
        StageId::Thoth => thoth::validate(output),
    }
}

/// Default sampling temperature.
#[must_use]
pub fn default_temperature(stage: StageId) -> f32 {
    match stage {
        StageId::Agape | StageId::Metis => 0.3,
        StageId::Eris => 0.4,
        StageId::ThaliaRose => 0.7,
        StageId::Thoth => 0.2,
    }
}

/// Stage option defaults merged with `overrides`, then validated.
pub fn effective_options(
    stage: StageId,
    overrides: &JsonObject,
) -> Result<JsonObject, PipelineValidationError> {
    let mut options = match stage {
        StageId::Agape => agape::default_options(),
        StageId::Eris => eris::default_options(),
        StageId::Metis => metis::default_options(),
        StageId::ThaliaRose | StageId::Thoth => JsonObject::new(),
    };
    for (key, value) in overrides {
        options.insert(key.clone(), value.clone());
    }

    let checked = match stage {
        StageId::Agape => agape::validate_options(&options),
        StageId::Eris => eris::validate_options(&options),
        StageId::Metis => metis::validate_options(&options),
        StageId::ThaliaRose | StageId::Thoth => Ok(()),
    };
    checked.map_err(|message| {
        ContractSuggestions::error(
            ContractSuggestions::SETTINGS,
            format!("{stage}: {message}"),
            vec![stage.to_string()],
        )
    })?;
    Ok(options)
}

pub(super) fn require<'a>(output: &'a JsonObject, field: &str, stage: StageId) -> Result<&'a Value, String> {
    output
        .get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| format!("Missing required field in {stage} output: {field}"))
}

pub(super) fn require_str(output: &JsonObject, field: &str, stage: StageId) -> Result<(), String> {
    if require(output, field, stage)?.is_string() {
        Ok(())
    } else {
        Err(format!("{field} must be a string"))
    }
}

pub(super) fn require_bool(output: &JsonObject, field: &str, stage: StageId) -> Result<(), String> {
    if require(output, field, stage)?.is_boolean() {
        Ok(())
    } else {
        Err(format!("{field} must be a boolean"))
    }
}

pub(super) fn require_score(output: &JsonObject, field: &str, stage: StageId) -> Result<(), String> {
    match require(output, field, stage)?.as_f64() {
        Some(score) if (0.0..=1.0).contains(&score) => Ok(()),
        _ => Err(format!("{field} must be a number between 0 and 1")),
    }
}

pub(super) fn require_one_of(
    output: &JsonObject,
    field: &str,
    allowed: &[&str],
    stage: StageId,
) -> Result<(), String> {
    match require(output, field, stage)?.as_str() {
        Some(value) if allowed.contains(&value) => Ok(()),
        _ => Err(format!("{field} must be one of: {}", allowed.join(", "))),
    }
}

pub(super) fn option_u64(options: &JsonObject, key: &str) -> Option<u64> {
    options.get(key).and_then(Value::as_u64)
}

pub(super) fn option_str<'a>(options: &'a JsonObject, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

/// Truncates an array field to `max` items, if present.
pub(super) fn truncate_array(output: &mut JsonObject, field: &str, max: Option<u64>) {
    let Some(max) = max.and_then(|max| usize::try_from(max).ok()) else {
        return;
    };
    if let Some(Value::Array(items)) = output.get_mut(field) {
        items.truncate(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_options_merge_defaults() {
        let overrides = json!({"max_actions": 5}).as_object().cloned().unwrap();
        let options = effective_options(StageId::Agape, &overrides).unwrap();
        assert_eq!(options["max_actions"], json!(5));
        assert_eq!(options["behavioral_threshold"], json!(0.7));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let overrides = json!({"gap_analysis_depth": "shallow"}).as_object().cloned().unwrap();
        let err = effective_options(StageId::Metis, &overrides).unwrap_err();
        assert_eq!(err.code(), Some(ContractSuggestions::SETTINGS));
        assert!(err.message.contains("gap_analysis_depth"));
    }

    #[test]
    fn test_prompts_name_their_stage() {
        let options = JsonObject::new();
        for stage in StageId::ALL {
            let prompt = system_prompt(stage, &effective_options(stage, &options).unwrap());
            assert!(prompt.contains(&format!("You are the {stage} stage")), "{stage}");
        }
    }
}
