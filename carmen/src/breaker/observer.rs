//! Hooks for reacting to breaker activity.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::CircuitState;

/// Receives breaker notifications.
///
/// Hooks are invoked after the breaker's lock is released, so an observer
/// may inspect the breaker it is attached to.
pub trait BreakerObserver: Send + Sync {
    /// Called when the breaker changes state.
    fn on_state_change(&self, name: &str, from: CircuitState, to: CircuitState);

    /// Called when a guarded call fails.
    fn on_failure(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called when a guarded call succeeds.
    fn on_success(&self, name: &str) {
        let _ = name;
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpBreakerObserver;

impl BreakerObserver for NoOpBreakerObserver {
    fn on_state_change(&self, _name: &str, _from: CircuitState, _to: CircuitState) {}
}

/// Observer that writes breaker activity to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBreakerObserver;

impl BreakerObserver for LoggingBreakerObserver {
    fn on_state_change(&self, name: &str, from: CircuitState, to: CircuitState) {
        if to == CircuitState::Open {
            warn!(breaker = %name, from = %from, to = %to, "Circuit breaker opened");
        } else {
            info!(breaker = %name, from = %from, to = %to, "Circuit breaker state changed");
        }
    }

    fn on_failure(&self, name: &str, error: &str) {
        debug!(breaker = %name, error = %error, "Guarded call failed");
    }
}

/// Observer that forwards every notification to each of its members in order.
#[derive(Clone, Default)]
pub struct CompositeBreakerObserver {
    observers: Vec<Arc<dyn BreakerObserver>>,
}

impl CompositeBreakerObserver {
    /// Creates a composite over `observers`.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn BreakerObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns true if there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for CompositeBreakerObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeBreakerObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl BreakerObserver for CompositeBreakerObserver {
    fn on_state_change(&self, name: &str, from: CircuitState, to: CircuitState) {
        for observer in &self.observers {
            observer.on_state_change(name, from, to);
        }
    }

    fn on_failure(&self, name: &str, error: &str) {
        for observer in &self.observers {
            observer.on_failure(name, error);
        }
    }

    fn on_success(&self, name: &str) {
        for observer in &self.observers {
            observer.on_success(name);
        }
    }
}
