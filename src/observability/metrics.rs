//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define breaker metrics (state, transitions, denials, fallbacks)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `circuit_breaker_transitions_total` (counter): by breaker, from, to
//! - `circuit_breaker_not_permitted_total` (counter): by breaker
//! - `circuit_breaker_fallbacks_total` (counter): by breaker, reason
//!
//! # Design Decisions
//! - Recorded through the observer hook, outside the breaker lock
//! - Without an installed recorder every update is a no-op

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::events::{FallbackCause, StateTransition, TransitionObserver};
use crate::resilience::state::CircuitState;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Observer that updates the breaker metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl MetricsObserver {
    /// Publish the initial state of a newly obtained breaker.
    pub fn register(&self, breaker: &str, state: CircuitState) {
        gauge!("circuit_breaker_state", "breaker" => breaker.to_string()).set(state.as_gauge());
    }
}

impl TransitionObserver for MetricsObserver {
    fn on_transition(&self, event: &StateTransition) {
        gauge!("circuit_breaker_state", "breaker" => event.breaker.clone())
            .set(event.to.as_gauge());
        counter!(
            "circuit_breaker_transitions_total",
            "breaker" => event.breaker.clone(),
            "from" => event.from.as_str(),
            "to" => event.to.as_str()
        )
        .increment(1);
    }

    fn on_call_not_permitted(&self, breaker: &str, _state: CircuitState) {
        counter!("circuit_breaker_not_permitted_total", "breaker" => breaker.to_string())
            .increment(1);
    }

    fn on_fallback(&self, breaker: &str, cause: FallbackCause, _detail: &str) {
        counter!(
            "circuit_breaker_fallbacks_total",
            "breaker" => breaker.to_string(),
            "reason" => cause.as_str()
        )
        .increment(1);
    }
}
