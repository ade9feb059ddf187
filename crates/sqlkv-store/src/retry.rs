//! Bounded, immediate retry of backend operations.

use std::future::Future;

use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Attempt budget for the generic engine's store and increment.
pub const GENERIC_MAX_ATTEMPTS: u32 = 10;

/// Attempt budget for the MySQL engine's increment.
pub const MYSQL_INCREMENT_MAX_ATTEMPTS: u32 = 3;

/// Run `op` until it succeeds, fails with an error `should_retry` rejects, or
/// `max_attempts` attempts have been made.
///
/// Retries happen immediately with no backoff. When the budget is exhausted
/// the last error is returned unmodified.
pub async fn retry<T, F, Fut, P>(
    operation: &str,
    max_attempts: u32,
    should_retry: P,
    mut op: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
    P: Fn(&StoreError) -> bool,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                warn!(operation, attempt, max_attempts, error = %e, "retrying after backend error");
                attempt = attempt.saturating_add(1);
            },
            Err(e) => return Err(e),
        }
    }
}
