//! Circuit breaker guarding calls to one named dependency.
//!
//! # Responsibilities
//! - Grant or deny permission per call, based on the state machine
//! - Time the protected call and classify its outcome
//! - Feed outcomes back and apply the resulting transition atomically
//! - Arm and invalidate the OPEN timer
//!
//! # Design Decisions
//! - One mutex per breaker: permission checks and outcome recording are a
//!   single atomic unit, and breakers never share mutable state
//! - Critical sections never suspend; the protected call runs outside the lock
//! - A `Permit` is an RAII guard: dropped unsettled (cancellation, panic) it
//!   records a FAILURE, so no outcome is silently lost
//! - Observers are notified after the lock is released

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::config::BreakerConfig;
use crate::resilience::error::{CallError, CallNotPermitted, ProtectedCallError};
use crate::resilience::events::{FallbackCause, StateTransition, TransitionObserver};
use crate::resilience::scheduler::{Scheduler, TimerHandle};
use crate::resilience::state::{CircuitState, Recorded, StateMachine, Transition};
use crate::resilience::timeouts::with_deadline;
use crate::resilience::window::OutcomeKind;

/// Handle to one named breaker. Clones share the same instance.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: BreakerConfig,
    core: Mutex<Core>,
    scheduler: Scheduler,
    observer: Arc<dyn TransitionObserver>,
}

struct Core {
    machine: StateMachine,
    /// Pending OPEN → HALF_OPEN timer of the current OPEN episode.
    timer: Option<TimerHandle>,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_rate: f32,
    pub slow_call_rate: f32,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
    pub half_open_permits: u32,
    pub not_permitted_calls: u64,
    pub stale_outcomes: u64,
}

impl CircuitBreaker {
    /// Build a breaker. The config is expected to be validated already;
    /// the registry does this for every breaker it creates.
    pub fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        scheduler: Scheduler,
        observer: Arc<dyn TransitionObserver>,
    ) -> Self {
        let machine = StateMachine::new(&config, Instant::now());
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                core: Mutex::new(Core {
                    machine,
                    timer: None,
                }),
                scheduler,
                observer,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.inner.config
    }

    /// True if both handles refer to the same breaker instance.
    pub fn ptr_eq(&self, other: &CircuitBreaker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current state, applying an OPEN → HALF_OPEN transition that is due.
    pub fn state(&self) -> CircuitState {
        self.inner.poll();
        self.inner.lock().machine.state()
    }

    /// Ask for permission to run one protected call.
    pub fn acquire_permission(&self) -> Result<Permit, CallNotPermitted> {
        self.inner.acquire()
    }

    /// Record the outcome of a permitted call.
    pub fn on_outcome(&self, permit: Permit, duration: Duration, succeeded: bool) {
        if !Arc::ptr_eq(&permit.inner, &self.inner) {
            tracing::warn!(
                breaker = %self.inner.name,
                permit_breaker = %permit.inner.name,
                "Outcome recorded through a different breaker than the one that granted the permit"
            );
        }
        permit.record(duration, succeeded);
    }

    /// Run a blocking protected call on the calling thread.
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = self.acquire_permission()?;

        let started = Instant::now();
        let result = operation();
        permit.record(started.elapsed(), result.is_ok());

        result.map_err(|e| CallError::Failed(ProtectedCallError::Failed(e)))
    }

    /// Run a non-blocking protected call.
    ///
    /// Permission is decided before this returns; `operation` is only invoked
    /// when granted. The returned future resolves after the outcome has been
    /// recorded. Dropping it early records a FAILURE.
    pub fn call_async<T, E, F, Fut>(
        &self,
        operation: F,
    ) -> impl Future<Output = Result<T, CallError<E>>> + Send + 'static
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.call_async_with_timeout(None, operation)
    }

    /// [`call_async`](Self::call_async) with an optional deadline on the protected call.
    pub fn call_async_with_timeout<T, E, F, Fut>(
        &self,
        timeout: Option<Duration>,
        operation: F,
    ) -> impl Future<Output = Result<T, CallError<E>>> + Send + 'static
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let admitted = self
            .acquire_permission()
            .map(|permit| (permit, operation()));

        async move {
            let (permit, call) = admitted?;

            let started = Instant::now();
            let result = with_deadline(timeout, call).await;
            permit.record(started.elapsed(), result.is_ok());

            result.map_err(CallError::Failed)
        }
    }

    /// Force the breaker back to CLOSED with an empty window.
    pub fn reset(&self) {
        let event = {
            let mut core = self.inner.lock();
            core.machine
                .reset(Instant::now())
                .map(|t| self.inner.apply(&mut core, t))
        };
        if let Some(event) = event {
            self.inner.publish(event);
        }
    }

    /// Tell the observer a fallback replaced this breaker's result.
    pub(crate) fn notify_fallback(&self, cause: FallbackCause, detail: &str) {
        self.inner.observer.on_fallback(&self.inner.name, cause, detail);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.inner.poll();
        let core = self.inner.lock();
        let stats = core.machine.window_stats();

        BreakerSnapshot {
            name: self.inner.name.clone(),
            state: core.machine.state(),
            failure_rate: stats.failure_rate(),
            slow_call_rate: stats.slow_call_rate(),
            buffered_calls: stats.total,
            failed_calls: stats.failures,
            slow_calls: stats.slow,
            half_open_permits: core.machine.half_open_granted(),
            not_permitted_calls: core.machine.not_permitted(),
            stale_outcomes: core.machine.stale_outcomes(),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        // Critical sections never run user code; a poisoned lock still holds consistent state.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(self: &Arc<Self>) -> Result<Permit, CallNotPermitted> {
        let now = Instant::now();
        let (decision, event) = {
            let mut core = self.lock();
            match core.machine.try_acquire(now) {
                Ok(grant) => {
                    let event = grant.transition.map(|t| self.apply(&mut core, t));
                    (Ok(grant), event)
                }
                Err(state) => (Err(state), None),
            }
        };

        if let Some(event) = event {
            self.publish(event);
        }

        match decision {
            Ok(grant) => Ok(Permit {
                inner: Arc::clone(self),
                generation: grant.generation,
                state: grant.state,
                acquired_at: now,
                settled: false,
            }),
            Err(state) => {
                tracing::debug!(breaker = %self.name, state = %state, "Call not permitted");
                self.observer.on_call_not_permitted(&self.name, state);
                Err(CallNotPermitted {
                    breaker: self.name.clone(),
                    state,
                })
            }
        }
    }

    fn record(self: &Arc<Self>, generation: u64, succeeded: bool, duration: Duration) {
        let kind = OutcomeKind::classify(
            succeeded,
            duration,
            self.config.slow_call_duration_threshold(),
        );

        let event = {
            let mut core = self.lock();
            match core.machine.record(generation, kind, duration, Instant::now()) {
                Recorded::Applied { transition } => transition.map(|t| self.apply(&mut core, t)),
                Recorded::Stale => {
                    tracing::debug!(
                        breaker = %self.name,
                        generation,
                        outcome = ?kind,
                        "Outcome arrived after its episode ended"
                    );
                    None
                }
            }
        };

        if let Some(event) = event {
            self.publish(event);
        }
    }

    fn poll(self: &Arc<Self>) {
        let event = {
            let mut core = self.lock();
            core.machine
                .poll(Instant::now())
                .map(|t| self.apply(&mut core, t))
        };
        if let Some(event) = event {
            self.publish(event);
        }
    }

    fn open_wait_elapsed(self: &Arc<Self>, generation: u64) {
        let event = {
            let mut core = self.lock();
            core.machine
                .open_wait_elapsed(generation, Instant::now())
                .map(|t| self.apply(&mut core, t))
        };
        if let Some(event) = event {
            self.publish(event);
        }
    }

    /// Side effects of a transition that must happen under the lock.
    fn apply(self: &Arc<Self>, core: &mut Core, transition: Transition) -> StateTransition {
        if let Some(timer) = core.timer.take() {
            timer.cancel();
        }

        if transition.to == CircuitState::Open {
            let breaker = Arc::downgrade(self);
            let generation = transition.generation;
            core.timer = Some(self.scheduler.schedule(
                self.config.wait_duration_in_open_state(),
                move || {
                    if let Some(inner) = breaker.upgrade() {
                        inner.open_wait_elapsed(generation);
                    }
                },
            ));
        }

        StateTransition {
            breaker: self.name.clone(),
            from: transition.from,
            to: transition.to,
            generation: transition.generation,
            at: SystemTime::now(),
        }
    }

    fn publish(&self, event: StateTransition) {
        tracing::debug!(
            breaker = %event.breaker,
            from = %event.from,
            to = %event.to,
            generation = event.generation,
            "Circuit breaker transition"
        );
        self.observer.on_transition(&event);
    }
}

/// Permission to run one protected call.
///
/// Settle it with [`Permit::record`] or [`CircuitBreaker::on_outcome`].
/// Dropping it unsettled records a FAILURE.
#[must_use = "dropping a permit records a failed call"]
pub struct Permit {
    inner: Arc<Inner>,
    generation: u64,
    state: CircuitState,
    acquired_at: Instant,
    settled: bool,
}

impl Permit {
    /// State the permit was granted in.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn breaker(&self) -> &str {
        &self.inner.name
    }

    /// Time since the permit was granted.
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Record the call's outcome with an explicit duration.
    pub fn record(mut self, duration: Duration, succeeded: bool) {
        self.settled = true;
        self.inner.record(self.generation, succeeded, duration);
    }

    /// Record the call's outcome, timed from permit acquisition.
    pub fn record_elapsed(self, succeeded: bool) {
        let duration = self.elapsed();
        self.record(duration, succeeded);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.settled {
            self.settled = true;
            tracing::debug!(
                breaker = %self.inner.name,
                "Permit dropped before its outcome was recorded, counting as failure"
            );
            self.inner
                .record(self.generation, false, self.acquired_at.elapsed());
        }
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("breaker", &self.inner.name)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish()
    }
}
