//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers produce (via TransitionObserver):
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments)
//! - Both sinks plug into the same observer hook and can be combined

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogObserver};
pub use metrics::{init_metrics, MetricsObserver};
