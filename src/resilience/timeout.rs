use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{HeimdallError, Result};

/// Run `fut` with an upper bound of `after`.
///
/// On expiry the future is dropped and [`HeimdallError::Timeout`] is
/// returned. Cancellation is cooperative: anything the future already
/// spawned keeps running.
pub async fn with_timeout<F, T>(after: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, after_ms = after.as_millis() as u64, "operation timed out");
            Err(HeimdallError::Timeout {
                operation: operation.to_owned(),
                after,
            })
        }
    }
}
