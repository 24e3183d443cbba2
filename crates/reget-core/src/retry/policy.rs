use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;

use super::classify::classify;
use crate::dispatch::{RequestOptions, Retry};
use crate::error::HttpError;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level failure (reset, refused, unreachable, DNS, broken pipe).
    Connection,
    /// Server asked us to slow down or is unavailable (420, 429, 502, 503, 504).
    Throttled,
    /// Anything else; never retried.
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Propagate the triggering error.
    GiveUp,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Custom per-request policy. Receives the error, the zero-based attempt
/// counter, the request and the default policy (to delegate to).
pub type RetryFn =
    Arc<dyn Fn(&HttpError, u32, &RequestOptions, &RetryPolicy) -> RetryDecision + Send + Sync>;

/// Linear backoff policy with a retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Backoff grows by this much per retry already performed.
    pub step: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            step: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Decide whether to retry `err`.
    ///
    /// `attempt` is zero-based: the number of retries already performed.
    /// Throttled statuses honor `Retry-After`; everything else retryable uses
    /// `min(max_delay, attempt * step)`.
    pub fn decide(&self, err: &HttpError, attempt: u32) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }

        match classify(err) {
            ErrorKind::Other => RetryDecision::GiveUp,
            ErrorKind::Connection => RetryDecision::RetryAfter(self.step_delay(attempt)),
            ErrorKind::Throttled => {
                let hinted = match err {
                    HttpError::Status(s) => parse_retry_after(&s.headers),
                    _ => None,
                };
                RetryDecision::RetryAfter(hinted.unwrap_or_else(|| self.step_delay(attempt)))
            }
        }
    }

    fn step_delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Evaluate the request's retry mode against `policy`.
pub fn evaluate(
    err: &HttpError,
    attempt: u32,
    request: &RequestOptions,
    policy: &RetryPolicy,
) -> RetryDecision {
    match &request.retry {
        Retry::Disabled => RetryDecision::GiveUp,
        Retry::Default => policy.decide(err, attempt),
        Retry::Custom(f) => f(err, attempt, request, policy),
    }
}

/// `Retry-After` as a delay. Only whole seconds are accepted; dates,
/// fractions and negative values yield None.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: u64 = raw.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}
