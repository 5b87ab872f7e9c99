//! The circuit breaker state machine.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::{
    BreakerObserver, BreakerSnapshot, CircuitState, Clock, NoOpBreakerObserver, SystemClock,
};

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Probation successes that close the circuit again.
    pub success_threshold: u32,
    /// Seconds the circuit stays open after the last failure.
    pub retry_timeout_secs: u64,
    /// Timeout applied to each guarded provider call.
    pub request_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            retry_timeout_secs: 300,
            request_timeout_secs: 30,
        }
    }
}

impl BreakerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the success threshold.
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Sets the retry timeout.
    #[must_use]
    pub fn with_retry_timeout_secs(mut self, secs: u64) -> Self {
        self.retry_timeout_secs = secs;
        self
    }

    /// Sets the per-call request timeout.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Returns the retry timeout as a duration.
    #[must_use]
    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    /// Returns the request timeout as a duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Error returned by a guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E = Infallible> {
    /// The circuit is open and the call was not attempted.
    #[error("circuit open - retry after {retry_after_secs} seconds")]
    Open {
        /// Whole seconds until the circuit may be probed again.
        retry_after_secs: u64,
    },

    /// The call was attempted and failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns true if the call was rejected without being attempted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    trials_in_flight: u32,
}

impl BreakerState {
    fn release_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
        }
    }
}

/// Releases a half-open trial slot if the guarded future is dropped before
/// its outcome is recorded.
struct TrialSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().release_trial();
        }
    }
}

/// A three-state circuit breaker.
///
/// The internal mutex is held only while counters are read or updated; the
/// guarded future always runs unlocked.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn BreakerObserver>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker using the system clock.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoOpBreakerObserver),
            inner: Mutex::new(BreakerState::default()),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Asks permission to make a call.
    ///
    /// An open circuit whose retry timeout has strictly elapsed moves to
    /// `HalfOpen` with fresh counters and admits the call. While half-open at
    /// most `success_threshold` calls are in flight; further callers are
    /// rejected with `retry_after_secs: 0` until one of them is recorded.
    /// Every admitted call must be followed by `record_success` or
    /// `record_failure`.
    pub fn try_acquire(&self) -> Result<(), BreakerError> {
        self.acquire().map(|_| ())
    }

    /// Returns whether the admitted call holds a half-open trial slot.
    fn acquire(&self) -> Result<bool, BreakerError> {
        let now = self.clock.now();
        let mut transition = None;
        let verdict = {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::Open {
                let elapsed = since(inner.last_failure, now);
                if elapsed > self.config.retry_timeout() {
                    inner.state = CircuitState::HalfOpen;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.trials_in_flight = 1;
                    transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                    Ok(true)
                } else {
                    let remaining = self.config.retry_timeout().saturating_sub(elapsed);
                    Err(BreakerError::Open {
                        retry_after_secs: ceil_secs(remaining),
                    })
                }
            } else if inner.state == CircuitState::HalfOpen {
                if inner.trials_in_flight >= self.config.success_threshold.max(1) {
                    Err(BreakerError::Open { retry_after_secs: 0 })
                } else {
                    inner.trials_in_flight += 1;
                    Ok(true)
                }
            } else {
                Ok(false)
            }
        };

        if let Some((from, to)) = transition {
            self.observer.on_state_change(&self.name, from, to);
        }
        verdict
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut transition = None;
        {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                }
                CircuitState::HalfOpen => {
                    inner.release_trial();
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.failure_count = 0;
                        inner.success_count = 0;
                        inner.trials_in_flight = 0;
                        transition = Some((CircuitState::HalfOpen, CircuitState::Closed));
                    }
                }
                // A call admitted before the circuit opened; the open window stands.
                CircuitState::Open => {}
            }
        }

        self.observer.on_success(&self.name);
        if let Some((from, to)) = transition {
            self.observer.on_state_change(&self.name, from, to);
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self, error: &str) {
        let now = self.clock.now();
        let mut transition = None;
        {
            let mut inner = self.inner.lock();
            inner.failure_count = inner.failure_count.saturating_add(1);
            inner.last_failure = Some(now);
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.success_count = 0;
                    inner.trials_in_flight = 0;
                    transition = Some((CircuitState::HalfOpen, CircuitState::Open));
                }
                CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                    inner.state = CircuitState::Open;
                    transition = Some((CircuitState::Closed, CircuitState::Open));
                }
                CircuitState::Closed | CircuitState::Open => {}
            }
        }

        self.observer.on_failure(&self.name, error);
        if let Some((from, to)) = transition {
            self.observer.on_state_change(&self.name, from, to);
        }
    }

    /// Runs `op` through the breaker, recording its outcome.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let trial = match self.acquire() {
            Ok(trial) => trial,
            Err(BreakerError::Open { retry_after_secs }) => {
                return Err(BreakerError::Open { retry_after_secs });
            }
            Err(BreakerError::Inner(never)) => match never {},
        };
        let mut slot = TrialSlot {
            breaker: self,
            armed: trial,
        };

        let outcome = op().await;
        slot.armed = false;
        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure(&e.to_string());
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Forces the breaker closed and clears all counters.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.state;
            *inner = BreakerState::default();
            previous
        };
        if previous != CircuitState::Closed {
            self.observer.on_state_change(&self.name, previous, CircuitState::Closed);
        }
    }

    /// Returns the current state label.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns true if the circuit is open and still inside its retry window.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner.state == CircuitState::Open
            && since(inner.last_failure, now) <= self.config.retry_timeout()
    }

    /// Returns true if the circuit is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Returns true if the circuit is on probation.
    #[must_use]
    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Returns the consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Returns the probation success count.
    #[must_use]
    pub fn success_count(&self) -> u32 {
        self.inner.lock().success_count
    }

    /// Returns a human-readable status line.
    #[must_use]
    pub fn status(&self) -> String {
        let now = self.clock.now();
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => {
                let remaining = self
                    .config
                    .retry_timeout()
                    .saturating_sub(since(inner.last_failure, now));
                format!(
                    "OPEN (retry in {}s, {}/{} failures)",
                    ceil_secs(remaining),
                    inner.failure_count,
                    self.config.failure_threshold
                )
            }
            CircuitState::HalfOpen => format!(
                "HALF_OPEN (probation: {}/{} successes needed)",
                inner.success_count, self.config.success_threshold
            ),
            CircuitState::Closed => format!(
                "CLOSED ({}/{} failures)",
                inner.failure_count, self.config.failure_threshold
            ),
        }
    }

    /// Returns a serializable copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            seconds_since_last_failure: inner
                .last_failure
                .map(|at| now.saturating_duration_since(at).as_secs()),
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

fn since(last_failure: Option<Instant>, now: Instant) -> Duration {
    last_failure.map_or(Duration::MAX, |at| now.saturating_duration_since(at))
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
