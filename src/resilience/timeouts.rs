//! Timeout enforcement for non-blocking protected calls.
//!
//! # Responsibilities
//! - Wrap a deferred protected call with an optional deadline
//! - Map expiry to a distinct error instead of the call's own error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; expiry drops (cancels) the inner future
//! - A timeout is a failure outcome, never a retry trigger

use std::future::Future;
use std::time::Duration;

use crate::resilience::error::ProtectedCallError;

/// Await `fut`, bounded by `deadline` when one is set.
pub async fn with_deadline<T, E, Fut>(
    deadline: Option<Duration>,
    fut: Fut,
) -> Result<T, ProtectedCallError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => return Err(ProtectedCallError::TimedOut(limit)),
        },
        None => fut.await,
    };

    result.map_err(ProtectedCallError::Failed)
}
