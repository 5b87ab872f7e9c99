//! Event sinks for run and breaker activity.
//!
//! The executor emits `pipeline.*` and `stage.*` events to the sink it was
//! built with. [`EventSinkObserver`] forwards breaker hooks to a sink as
//! `breaker.*` events.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde_json::json;
use std::sync::Arc;

use crate::breaker::{BreakerObserver, CircuitState};

/// Breaker observer that turns hooks into events.
pub struct EventSinkObserver {
    sink: Arc<dyn EventSink>,
}

impl EventSinkObserver {
    /// Creates an observer emitting to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }
}

impl BreakerObserver for EventSinkObserver {
    fn on_state_change(&self, name: &str, from: CircuitState, to: CircuitState) {
        self.sink.try_emit(
            "breaker.state_changed",
            Some(json!({"breaker": name, "from": from, "to": to})),
        );
    }

    fn on_failure(&self, name: &str, error: &str) {
        self.sink
            .try_emit("breaker.failure", Some(json!({"breaker": name, "error": error})));
    }

    fn on_success(&self, name: &str) {
        self.sink.try_emit("breaker.success", Some(json!({"breaker": name})));
    }
}

impl std::fmt::Debug for EventSinkObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSinkObserver").finish_non_exhaustive()
    }
}
