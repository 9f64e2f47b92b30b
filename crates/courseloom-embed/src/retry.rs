//! Generic retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Ceiling on any single backoff wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Run `operation` up to `max_attempts` times, sleeping between attempts.
///
/// The wait before attempt `n + 1` is `base_delay(&error) * 2^(n-1)`, capped
/// at [`MAX_BACKOFF`]; `base_delay` sees the error from attempt `n`, so the
/// base can depend on its classification. The last error is returned once
/// the budget is spent.
pub async fn retry_with_backoff<T, E, F, Fut, D>(
    mut operation: F,
    max_attempts: u32,
    base_delay: D,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: Fn(&E) -> Duration,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= max_attempts => return Err(error),
            Err(error) => {
                let backoff =
                    (base_delay(&error) * 2u32.saturating_pow(attempt - 1)).min(MAX_BACKOFF);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, max_attempts, error, backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
