//! Breaker state labels and snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    #[default]
    Closed,
    /// Calls are rejected until the retry timeout elapses.
    Open,
    /// Calls pass through on probation.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// A point-in-time copy of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Breaker name (usually the provider).
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures counted so far.
    pub failure_count: u32,
    /// Probation successes counted so far.
    pub success_count: u32,
    /// Seconds since the last failure, if any failure was recorded.
    pub seconds_since_last_failure: Option<u64>,
}
