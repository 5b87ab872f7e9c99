//! Three-state circuit breaker guarding calls to a provider.
//!
//! A breaker starts `Closed`, opens after `failure_threshold` consecutive
//! failures, rejects calls until `retry_timeout` has elapsed since the last
//! failure, then lets calls through on `HalfOpen` probation until
//! `success_threshold` successes close it again.
//!
//! Breakers are long-lived and shared between runs. One breaker per provider
//! is handed out by [`BreakerRegistry`].

mod circuit;
mod clock;
mod observer;
mod registry;
mod state;

pub use circuit::{BreakerConfig, BreakerError, CircuitBreaker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use observer::{BreakerObserver, CompositeBreakerObserver, LoggingBreakerObserver, NoOpBreakerObserver};
pub use registry::BreakerRegistry;
pub use state::{BreakerSnapshot, CircuitState};
