//! Core domain model types for carmen.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The closed set of stage identifiers
//! - Stage outcome labels
//! - The immutable per-stage result record

mod result;
mod stage_id;
mod status;

pub use result::{StageOutputs, StageResult};
pub use stage_id::{StageId, UnknownStageError};
pub use status::StageOutcome;

/// A JSON object, the payload shape every stage produces.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
