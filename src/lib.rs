//! Circuit breaker engine for guarding calls to remote dependencies.

pub mod config;
pub mod observability;
pub mod remote;
pub mod resilience;

pub use config::schema::{BreakerConfig, EngineConfig};
pub use resilience::{
    CallError, CircuitBreaker, CircuitState, FallbackDispatcher, Guarded, Registry, Scheduler,
};
