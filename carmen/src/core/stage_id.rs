//! The closed set of CARMEN stage identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies one of the five analysis stages.
///
/// Declaration order is the canonical order used for success flags and
/// response synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageId {
    /// Loving-action analysis.
    Agape,
    /// Root-cause and discord analysis.
    Eris,
    /// Empathy and gap analysis.
    Metis,
    /// Humor appropriateness.
    ThaliaRose,
    /// Claim verification.
    Thoth,
}

impl StageId {
    /// All stages in canonical order.
    pub const ALL: [StageId; 5] = [
        StageId::Agape,
        StageId::Eris,
        StageId::Metis,
        StageId::ThaliaRose,
        StageId::Thoth,
    ];

    /// Returns the upper-case stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agape => "AGAPE",
            Self::Eris => "ERIS",
            Self::Metis => "METIS",
            Self::ThaliaRose => "THALIA_ROSE",
            Self::Thoth => "THOTH",
        }
    }

    /// Position in the canonical order.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Agape => 0,
            Self::Eris => 1,
            Self::Metis => 2,
            Self::ThaliaRose => 3,
            Self::Thoth => 4,
        }
    }

    /// Default execution priority (lower runs first).
    #[must_use]
    pub const fn default_priority(self) -> i32 {
        match self {
            Self::Agape => 1,
            Self::Eris => 2,
            Self::Metis => 3,
            Self::ThaliaRose => 4,
            Self::Thoth => 5,
        }
    }

    /// Default soft dependencies.
    #[must_use]
    pub const fn default_dependencies(self) -> &'static [StageId] {
        match self {
            Self::Agape | Self::Thoth => &[],
            Self::Eris => &[Self::Agape],
            Self::Metis => &[Self::Eris],
            Self::ThaliaRose => &[Self::Eris],
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown stage: {0}")]
pub struct UnknownStageError(pub String);

impl FromStr for StageId {
    type Err = UnknownStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| UnknownStageError(s.to_string()))
    }
}
