//! Optimistic Transactions
//!
//! Read-modify-write against a [`DocumentStore`](crate::store::DocumentStore)
//! retried on conflict, the same contract a document database offers with
//! `runTransaction`.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Attempts before a transaction reports contention
pub const MAX_ATTEMPTS: usize = 5;

/// Run `body` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` conflicts have happened.
///
/// The body must do all its reads inside the closure so that every attempt
/// sees fresh versions.
pub async fn run<T, F, Fut>(max_attempts: usize, mut body: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_attempts {
        match body().await {
            Err(e) if e.is_conflict() => {
                tracing::debug!(attempt, error = %e, "Transaction conflict, retrying");
                // Linear backoff, short enough to stay inside a request
                tokio::time::sleep(Duration::from_millis(5 * attempt as u64)).await;
            }
            other => return other,
        }
    }

    tracing::warn!(attempts = max_attempts, "Transaction gave up after repeated conflicts");
    Err(StoreError::Contention {
        attempts: max_attempts,
    })
}
