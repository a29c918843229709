//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Protected call:
//!     → registry.rs (resolve named breaker, created once)
//!     → circuit_breaker.rs (acquire permit from state.rs)
//!         → denied: fallback.rs (substitute result)
//!         → granted: run call (timeouts.rs bounds non-blocking calls)
//!     → window.rs (classify + record outcome)
//!     → state.rs (evaluate thresholds, transition)
//!     → scheduler.rs (arm OPEN → HALF_OPEN timer)
//!     → events.rs (notify observers)
//! ```
//!
//! # Design Decisions
//! - Breakers are independent: each owns its own lock and window
//! - Blocking and non-blocking callers share one breaker and one state machine
//! - No retries: a denied or failed call goes to the fallback exactly once

pub mod circuit_breaker;
pub mod error;
pub mod events;
pub mod fallback;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod timeouts;
pub mod window;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, Permit};
pub use error::{
    CallError, CallNotPermitted, ConfigConflictError, FallbackError, ProtectedCallError,
    RegistryError,
};
pub use events::{FallbackCause, NoopObserver, StateTransition, TransitionObserver};
pub use fallback::{FallbackDispatcher, Guarded};
pub use registry::Registry;
pub use scheduler::{Scheduler, TimerHandle};
pub use state::CircuitState;
pub use window::{OutcomeKind, OutcomeWindow};
