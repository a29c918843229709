//! Timer facility driving OPEN → HALF_OPEN.
//!
//! # Responsibilities
//! - Run one-shot timers independently of caller threads
//! - Allow a pending timer to be cancelled
//!
//! # Design Decisions
//! - Backed by a Tokio runtime handle: either the caller's runtime or a
//!   dedicated single-threaded runtime on its own OS thread, so breakers used
//!   purely from blocking threads still transition on time
//! - Each timer fires at most once; staleness is decided by the breaker, so
//!   a timer that loses a race with cancellation is harmless

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Shared scheduling facility. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
    _driver: Option<Arc<Driver>>,
}

/// Keeps a dedicated runtime thread alive until the last scheduler clone drops.
struct Driver {
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Scheduler {
    /// Schedule timers on an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            _driver: None,
        }
    }

    /// Schedule timers on the runtime of the calling task, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    /// Spawn a dedicated timer thread with its own single-threaded runtime.
    pub fn dedicated() -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let handle = runtime.handle().clone();
        let (tx, rx) = oneshot::channel::<()>();

        thread::Builder::new()
            .name("breaker-scheduler".into())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = rx.await;
                });
                tracing::debug!("Breaker scheduler stopped");
            })?;

        Ok(Self {
            handle,
            _driver: Some(Arc::new(Driver { shutdown: Some(tx) })),
        })
    }

    /// The caller's runtime when there is one, a dedicated thread otherwise.
    pub fn current_or_dedicated() -> std::io::Result<Self> {
        match Self::current() {
            Some(scheduler) => Ok(scheduler),
            None => Self::dedicated(),
        }
    }

    /// Run `task` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });

        TimerHandle {
            abort: join.abort_handle(),
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("dedicated", &self._driver.is_some())
            .finish()
    }
}

/// A pending timer.
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    /// Prevent the timer from firing if it has not fired yet.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}
