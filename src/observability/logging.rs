//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binary
//! - Log breaker events through the observer hook
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::resilience::events::{FallbackCause, StateTransition, TransitionObserver};
use crate::resilience::state::CircuitState;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let json = config.json_logs;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()
}

/// Observer that writes breaker events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl TransitionObserver for LogObserver {
    fn on_transition(&self, event: &StateTransition) {
        if event.to == CircuitState::Open {
            tracing::warn!(
                breaker = %event.breaker,
                from = %event.from,
                to = %event.to,
                generation = event.generation,
                "CircuitBreaker '{}' changed state from {} to {}",
                event.breaker,
                event.from,
                event.to
            );
        } else {
            tracing::info!(
                breaker = %event.breaker,
                from = %event.from,
                to = %event.to,
                generation = event.generation,
                "CircuitBreaker '{}' changed state from {} to {}",
                event.breaker,
                event.from,
                event.to
            );
        }
    }

    fn on_call_not_permitted(&self, breaker: &str, state: CircuitState) {
        tracing::debug!(breaker = %breaker, state = %state, "Call not permitted");
    }

    fn on_fallback(&self, breaker: &str, cause: FallbackCause, detail: &str) {
        tracing::error!(breaker = %breaker, cause = cause.as_str(), "Fallback : {}", detail);
    }
}
