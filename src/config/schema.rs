//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the circuit-breaker engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Named breaker definitions. A name absent here resolves to
    /// [`BreakerConfig::default`].
    pub breakers: BTreeMap<String, BreakerConfig>,
}

impl EngineConfig {
    /// Configuration registered for `name`, or the default one.
    pub fn breaker(&self, name: &str) -> BreakerConfig {
        self.breakers.get(name).cloned().unwrap_or_default()
    }
}

/// Per-breaker configuration. Immutable once a breaker is built from it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Percentage of failed calls in the window that forces OPEN.
    pub failure_rate_threshold: f32,

    /// Percentage of slow calls in the window that forces OPEN.
    pub slow_call_rate_threshold: f32,

    /// Calls at or above this latency are classified slow, in milliseconds.
    pub slow_call_duration_threshold_ms: u64,

    /// Sample floor before any rate is trusted.
    pub minimum_number_of_calls: u32,

    /// Capacity of the count-based sliding window.
    pub sliding_window_size: u32,

    /// OPEN dwell time before probing, in milliseconds.
    pub wait_duration_in_open_state_ms: u64,

    /// Trial batch size in HALF_OPEN.
    pub permitted_number_of_calls_in_half_open_state: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_threshold_ms: 60_000,
            minimum_number_of_calls: 100,
            sliding_window_size: 100,
            wait_duration_in_open_state_ms: 60_000,
            permitted_number_of_calls_in_half_open_state: 10,
        }
    }
}

impl BreakerConfig {
    pub fn slow_call_duration_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_call_duration_threshold_ms)
    }

    pub fn wait_duration_in_open_state(&self) -> Duration {
        Duration::from_millis(self.wait_duration_in_open_state_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
