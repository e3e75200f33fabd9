//! Bounded-retry combinator

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Run `op` up to `max_attempts` times, sleeping `backoff` between attempts.
///
/// An error is retried only while `should_retry` approves it; the first
/// rejected error is returned as-is, as is the last error once attempts
/// are exhausted. `max_attempts` of zero is treated as one.
pub async fn with_fixed_backoff<T, E, F, Fut, R>(
    max_attempts: u32,
    backoff: Duration,
    mut should_retry: R,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "attempt failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
