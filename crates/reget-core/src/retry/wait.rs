//! Cancellable backoff wait between attempts.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::HttpError;

/// Sleep for `delay` unless `signal` fires first.
///
/// Returns `Err(HttpError::Cancelled)` on cancellation; the timer is dropped
/// with the losing branch so nothing stays scheduled.
pub async fn backoff(delay: Duration, signal: &CancellationToken) -> Result<(), HttpError> {
    if signal.is_cancelled() {
        return Err(HttpError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(HttpError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
