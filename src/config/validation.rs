//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds are percentages, counts >= 1)
//! - Check cross-field constraints (sample floor fits in the window)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: config → Result<(), Vec<ValidationError>>
//! - Runs before a breaker is built from a config

use thiserror::Error;

use crate::config::schema::{BreakerConfig, EngineConfig};

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{breaker}: {field} must be a finite percentage in [0, 100], got {value}")]
    InvalidPercentage {
        breaker: String,
        field: &'static str,
        value: f32,
    },

    #[error("{breaker}: {field} must be at least 1")]
    ZeroCount {
        breaker: String,
        field: &'static str,
    },

    #[error("{breaker}: minimum_number_of_calls ({minimum}) exceeds sliding_window_size ({window})")]
    MinimumExceedsWindow {
        breaker: String,
        minimum: u32,
        window: u32,
    },
}

/// Validate every breaker in the engine config.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let errors: Vec<ValidationError> = config
        .breakers
        .iter()
        .filter_map(|(name, breaker)| validate_breaker(name, breaker).err())
        .flatten()
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single breaker config.
pub fn validate_breaker(name: &str, config: &BreakerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("failure_rate_threshold", config.failure_rate_threshold),
        ("slow_call_rate_threshold", config.slow_call_rate_threshold),
    ] {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            errors.push(ValidationError::InvalidPercentage {
                breaker: name.to_string(),
                field,
                value,
            });
        }
    }

    for (field, value) in [
        ("minimum_number_of_calls", config.minimum_number_of_calls),
        ("sliding_window_size", config.sliding_window_size),
        (
            "permitted_number_of_calls_in_half_open_state",
            config.permitted_number_of_calls_in_half_open_state,
        ),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroCount {
                breaker: name.to_string(),
                field,
            });
        }
    }

    if config.minimum_number_of_calls > config.sliding_window_size {
        errors.push(ValidationError::MinimumExceedsWindow {
            breaker: name.to_string(),
            minimum: config.minimum_number_of_calls,
            window: config.sliding_window_size,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
