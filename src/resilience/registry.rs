//! Named breaker registry.
//!
//! # Responsibilities
//! - Create a breaker on first lookup of a name, return it afterwards
//! - Reject later lookups that bring a different config
//! - Expose snapshots of every breaker
//!
//! # Design Decisions
//! - Owned by the composition root and passed around explicitly; no global
//! - Config is fixed by the first lookup; a differing config is an error,
//!   never merged
//! - Concurrent first use creates exactly one instance per name (the map's
//!   entry lock covers construction)

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::validation::validate_breaker;
use crate::config::{BreakerConfig, EngineConfig};
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::resilience::error::{ConfigConflictError, RegistryError};
use crate::resilience::events::{NoopObserver, TransitionObserver};
use crate::resilience::scheduler::Scheduler;

/// Process-wide set of named breakers.
#[derive(Clone)]
pub struct Registry {
    breakers: Arc<DashMap<String, CircuitBreaker>>,
    configured: Arc<EngineConfig>,
    scheduler: Scheduler,
    observer: Arc<dyn TransitionObserver>,
}

impl Registry {
    /// Create an empty registry with no preloaded configs.
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            configured: Arc::new(EngineConfig::default()),
            scheduler,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Create a registry that resolves names through `config.breakers`.
    pub fn from_config(config: &EngineConfig, scheduler: Scheduler) -> Self {
        Self {
            configured: Arc::new(config.clone()),
            ..Self::new(scheduler)
        }
    }

    /// Observer handed to every breaker created afterwards.
    pub fn with_observer(mut self, observer: Arc<dyn TransitionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Look up `name`, creating it from `config` on first use.
    pub fn get(&self, name: &str, config: BreakerConfig) -> Result<CircuitBreaker, RegistryError> {
        let breaker = match self.breakers.entry(name.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(vacant) => {
                validate_breaker(name, &config).map_err(|errors| RegistryError::InvalidConfig {
                    name: name.to_string(),
                    errors,
                })?;

                tracing::info!(
                    breaker = %name,
                    failure_rate_threshold = config.failure_rate_threshold,
                    sliding_window_size = config.sliding_window_size,
                    minimum_number_of_calls = config.minimum_number_of_calls,
                    "Circuit breaker created"
                );
                let breaker = CircuitBreaker::new(
                    name,
                    config,
                    self.scheduler.clone(),
                    Arc::clone(&self.observer),
                );
                return Ok(vacant.insert(breaker).clone());
            }
        };

        if breaker.config() != &config {
            return Err(ConfigConflictError {
                name: name.to_string(),
                existing: breaker.config().clone(),
                requested: config,
            }
            .into());
        }

        Ok(breaker)
    }

    /// Look up `name` with its configured settings, or the defaults.
    pub fn breaker(&self, name: &str) -> Result<CircuitBreaker, RegistryError> {
        self.get(name, self.configured.breaker(name))
    }

    /// Existing breaker, without creating one.
    pub fn find(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        // Collect handles first so no map shard stays locked while snapshotting.
        let breakers: Vec<CircuitBreaker> = self.breakers.iter().map(|r| r.value().clone()).collect();
        let mut snapshots: Vec<_> = breakers.iter().map(CircuitBreaker::snapshot).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("breakers", &self.names())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
