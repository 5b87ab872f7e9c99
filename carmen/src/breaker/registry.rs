//! One breaker per provider, shared across runs.

use dashmap::DashMap;
use std::sync::Arc;

use super::{BreakerConfig, BreakerObserver, BreakerSnapshot, CircuitBreaker, Clock, LoggingBreakerObserver, SystemClock};

/// Hands out a long-lived breaker per provider name.
///
/// Whoever composes the pipeline owns the registry and injects the breakers
/// into the stages it builds.
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn BreakerObserver>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Creates a registry whose breakers log their transitions.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            observer: Arc::new(LoggingBreakerObserver),
            breakers: DashMap::new(),
        }
    }

    /// Sets the clock used by breakers created from now on.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the observer used by breakers created from now on.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the breaker for `provider`, creating it on first use.
    pub fn get_or_create(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(
                    CircuitBreaker::new(provider, self.config.clone())
                        .with_clock(self.clock.clone())
                        .with_observer(self.observer.clone()),
                )
            })
            .clone()
    }

    /// Returns the breaker for `provider` if one exists.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(provider).map(|entry| entry.value().clone())
    }

    /// Resets every breaker to closed.
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
    }

    /// Returns snapshots of all breakers, sorted by name.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> =
            self.breakers.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Returns the number of breakers created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true if no breaker has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("config", &self.config)
            .field("breakers", &self.snapshots())
            .finish()
    }
}
