//! Fallback dispatch and the guarded-call façade.
//!
//! # Data Flow
//! ```text
//! Guarded::call / call_async
//!     → CircuitBreaker (permission, timing, outcome)
//!     → Ok(value)                         → caller
//!     → Err(CallError) → FallbackDispatcher → Ok(substitute) | Err(FallbackError) → caller
//! ```
//!
//! # Design Decisions
//! - The fallback is fixed when the `Guarded` is built; no lookup by name
//! - A failing fallback is fatal for that call; there is no fallback-of-fallback
//! - In the non-blocking style the fallback runs inside the caller's future,
//!   so dropping that future also drops an in-flight fallback

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::error::{CallError, FallbackError};

type ImmediateFn<T, E> = dyn Fn(&CallError<E>) -> Result<T, FallbackError> + Send + Sync;
type DeferredFn<T, E> =
    dyn Fn(CallError<E>) -> BoxFuture<'static, Result<T, FallbackError>> + Send + Sync;

enum Handler<T, E> {
    Immediate(Arc<ImmediateFn<T, E>>),
    Deferred(Arc<DeferredFn<T, E>>),
}

/// Produces a substitute result from the reason a call did not succeed.
pub struct FallbackDispatcher<T, E> {
    handler: Handler<T, E>,
}

impl<T, E> Clone for FallbackDispatcher<T, E> {
    fn clone(&self) -> Self {
        let handler = match &self.handler {
            Handler::Immediate(f) => Handler::Immediate(Arc::clone(f)),
            Handler::Deferred(f) => Handler::Deferred(Arc::clone(f)),
        };
        Self { handler }
    }
}

impl<T, E> FallbackDispatcher<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// A fallback computed synchronously.
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(&CallError<E>) -> Result<T, FallbackError> + Send + Sync + 'static,
    {
        Self {
            handler: Handler::Immediate(Arc::new(f)),
        }
    }

    /// A fallback computed by a future.
    ///
    /// When dispatched from the blocking style the future is driven on the
    /// calling thread, so it must not rely on a Tokio runtime context.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(CallError<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FallbackError>> + Send + 'static,
    {
        Self {
            handler: Handler::Deferred(Arc::new(move |reason: CallError<E>| f(reason).boxed())),
        }
    }

    /// Always substitute the same value.
    pub fn value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::immediate(move |_| Ok(value.clone()))
    }

    /// Compute the substitute on the calling thread.
    pub fn dispatch(&self, reason: CallError<E>) -> Result<T, FallbackError> {
        match &self.handler {
            Handler::Immediate(f) => f(&reason),
            Handler::Deferred(f) => futures::executor::block_on(f(reason)),
        }
    }

    /// Compute the substitute as a deferred result.
    pub fn dispatch_async(&self, reason: CallError<E>) -> BoxFuture<'static, Result<T, FallbackError>> {
        match &self.handler {
            Handler::Immediate(f) => future::ready(f(&reason)).boxed(),
            Handler::Deferred(f) => f(reason),
        }
    }
}

/// A breaker composed with its fallback: callers always get a real or a
/// substitute value, never the protected call's own error.
pub struct Guarded<T, E> {
    breaker: CircuitBreaker,
    fallback: FallbackDispatcher<T, E>,
    timeout: Option<Duration>,
}

impl<T, E> Clone for Guarded<T, E> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            fallback: self.fallback.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T, E> Guarded<T, E>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new(breaker: CircuitBreaker, fallback: FallbackDispatcher<T, E>) -> Self {
        Self {
            breaker,
            fallback,
            timeout: None,
        }
    }

    /// Bound non-blocking protected calls by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Blocking style.
    pub fn call<F>(&self, operation: F) -> Result<T, FallbackError>
    where
        F: FnOnce() -> Result<T, E>,
    {
        match self.breaker.call(operation) {
            Ok(value) => Ok(value),
            Err(reason) => {
                announce(&self.breaker, &reason);
                self.fallback.dispatch(reason).inspect_err(|e| fallback_failed(&self.breaker, e))
            }
        }
    }

    /// Non-blocking style. Permission is decided before this returns.
    pub fn call_async<F, Fut>(
        &self,
        operation: F,
    ) -> impl Future<Output = Result<T, FallbackError>> + Send + 'static
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let call = self.breaker.call_async_with_timeout(self.timeout, operation);
        let breaker = self.breaker.clone();
        let fallback = self.fallback.clone();

        async move {
            match call.await {
                Ok(value) => Ok(value),
                Err(reason) => {
                    announce(&breaker, &reason);
                    fallback
                        .dispatch_async(reason)
                        .await
                        .inspect_err(|e| fallback_failed(&breaker, e))
                }
            }
        }
    }
}

fn announce<E: Display>(breaker: &CircuitBreaker, reason: &CallError<E>) {
    let detail = reason.to_string();
    tracing::debug!(breaker = %breaker.name(), cause = reason.cause().as_str(), "Dispatching fallback");
    breaker.notify_fallback(reason.cause(), &detail);
}

fn fallback_failed(breaker: &CircuitBreaker, error: &FallbackError) {
    tracing::error!(breaker = %breaker.name(), error = %error, "Fallback failed");
}
