//! Retry policy evaluator.
//!
//! Classifies failures (connection-class transport errors, rate/availability
//! statuses), computes backoff, enforces the retry budget and provides the
//! cancellable wait used between attempts. Shared by the resume controller
//! and anything else that re-issues requests.

mod classify;
mod error;
mod policy;
mod wait;

pub use classify::{classify, classify_curl_error, classify_status, classify_transport};
pub use error::{TransportError, TransportErrorKind};
pub use policy::{evaluate, parse_retry_after, ErrorKind, RetryDecision, RetryFn, RetryPolicy};
pub use wait::backoff;
