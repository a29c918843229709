//! Error taxonomy for guarded calls and the registry.

use std::time::Duration;

use thiserror::Error;

use crate::config::{BreakerConfig, ValidationError};
use crate::resilience::events::FallbackCause;
use crate::resilience::state::CircuitState;

/// The breaker refused to run the protected call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("CircuitBreaker '{breaker}' is {state} and does not permit further calls")]
pub struct CallNotPermitted {
    pub breaker: String,
    pub state: CircuitState,
}

/// The protected call itself did not produce a value.
#[derive(Debug, Error)]
pub enum ProtectedCallError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("protected call timed out after {0:?}")]
    TimedOut(Duration),
}

/// Reason handed to the fallback.
#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error(transparent)]
    NotPermitted(#[from] CallNotPermitted),

    #[error(transparent)]
    Failed(ProtectedCallError<E>),
}

impl<E> CallError<E> {
    pub fn cause(&self) -> FallbackCause {
        match self {
            CallError::NotPermitted(_) => FallbackCause::NotPermitted,
            CallError::Failed(ProtectedCallError::Failed(_)) => FallbackCause::CallFailed,
            CallError::Failed(ProtectedCallError::TimedOut(_)) => FallbackCause::TimedOut,
        }
    }

    pub fn is_not_permitted(&self) -> bool {
        matches!(self, CallError::NotPermitted(_))
    }

    /// The protected call's own error, if that is what failed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CallError::Failed(ProtectedCallError::Failed(e)) => Some(e),
            _ => None,
        }
    }
}

/// The fallback computation failed. Fatal for the call that triggered it.
#[derive(Debug, Error)]
#[error("fallback failed: {message}")]
pub struct FallbackError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source<S>(source: S) -> Self
    where
        S: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A second lookup supplied a different config for an existing breaker.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("breaker '{name}' already exists with a different configuration")]
pub struct ConfigConflictError {
    pub name: String,
    pub existing: BreakerConfig,
    pub requested: BreakerConfig,
}

/// Errors surfaced by [`crate::resilience::Registry`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Conflict(#[from] ConfigConflictError),

    #[error("invalid configuration for breaker '{name}': {}", summarize(.errors))]
    InvalidConfig {
        name: String,
        errors: Vec<ValidationError>,
    },
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
