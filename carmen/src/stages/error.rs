//! Stage error types.

use thiserror::Error;

use crate::core::StageId;
use crate::llm::ProviderError;

/// Why a stage could not produce live output.
///
/// Every variant except [`StageError::Internal`] is recovered inside the
/// stage by substituting fallback output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    /// No usable live client.
    #[error("{stage}: {reason}")]
    Unavailable {
        /// The stage.
        stage: StageId,
        /// Why the client cannot be used.
        reason: String,
    },

    /// The breaker rejected the call without attempting it.
    #[error("circuit open - retry after {retry_after_secs} seconds")]
    CircuitOpen {
        /// The stage.
        stage: StageId,
        /// Whole seconds until the breaker may be probed.
        retry_after_secs: u64,
    },

    /// The provider call failed.
    #[error("{stage}: {source}")]
    Provider {
        /// The stage.
        stage: StageId,
        /// The transport error.
        source: ProviderError,
    },

    /// The provider answered but the payload failed validation.
    #[error("{stage}: malformed output: {reason}")]
    MalformedOutput {
        /// The stage.
        stage: StageId,
        /// What was wrong with it.
        reason: String,
    },

    /// An unexpected error inside the stage.
    #[error("{stage}: internal error: {message}")]
    Internal {
        /// The stage.
        stage: StageId,
        /// Description.
        message: String,
    },
}

impl StageError {
    /// Creates an internal error.
    pub fn internal(stage: StageId, message: impl Into<String>) -> Self {
        Self::Internal {
            stage,
            message: message.into(),
        }
    }

    /// Creates a malformed-output error.
    pub fn malformed(stage: StageId, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            stage,
            reason: reason.into(),
        }
    }

    /// The stage the error belongs to.
    #[must_use]
    pub fn stage(&self) -> StageId {
        match self {
            Self::Unavailable { stage, .. }
            | Self::CircuitOpen { stage, .. }
            | Self::Provider { stage, .. }
            | Self::MalformedOutput { stage, .. }
            | Self::Internal { stage, .. } => *stage,
        }
    }

    /// Whether the stage may substitute fallback output.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_open_message() {
        let err = StageError::CircuitOpen {
            stage: StageId::Eris,
            retry_after_secs: 1,
        };
        assert_eq!(err.to_string(), "circuit open - retry after 1 seconds");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_internal_not_recoverable() {
        let err = StageError::internal(StageId::Thoth, "bug");
        assert_eq!(err.stage(), StageId::Thoth);
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "THOTH: internal error: bug");
    }
}
