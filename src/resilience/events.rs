//! Observer hook for breaker activity.
//!
//! Observers are notified after the breaker's lock is released, so a slow
//! sink never stalls callers, but two events for one breaker may reach the
//! observer out of order under contention. The `generation` field orders
//! transitions unambiguously.

use std::sync::Arc;
use std::time::SystemTime;

use crate::resilience::state::CircuitState;

/// A state change of one named breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub generation: u64,
    pub at: SystemTime,
}

/// Why a fallback was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    NotPermitted,
    CallFailed,
    TimedOut,
}

impl FallbackCause {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackCause::NotPermitted => "not_permitted",
            FallbackCause::CallFailed => "call_failed",
            FallbackCause::TimedOut => "timed_out",
        }
    }
}

/// External sink for breaker events. Every method defaults to a no-op.
pub trait TransitionObserver: Send + Sync {
    fn on_transition(&self, _event: &StateTransition) {}

    fn on_call_not_permitted(&self, _breaker: &str, _state: CircuitState) {}

    fn on_fallback(&self, _breaker: &str, _cause: FallbackCause, _detail: &str) {}
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransitionObserver for NoopObserver {}

impl TransitionObserver for Vec<Arc<dyn TransitionObserver>> {
    fn on_transition(&self, event: &StateTransition) {
        for observer in self {
            observer.on_transition(event);
        }
    }

    fn on_call_not_permitted(&self, breaker: &str, state: CircuitState) {
        for observer in self {
            observer.on_call_not_permitted(breaker, state);
        }
    }

    fn on_fallback(&self, breaker: &str, cause: FallbackCause, detail: &str) {
        for observer in self {
            observer.on_fallback(breaker, cause, detail);
        }
    }
}
