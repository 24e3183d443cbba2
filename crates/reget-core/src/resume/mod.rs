//! Resume controller.
//!
//! Wraps response delivery for one logical request: tracks how many bytes the
//! caller has seen, and when the stream breaks re-issues the request as
//! `If-Match` + `Range` for the undelivered tail. A resumed response is only
//! spliced in if it proves continuity (206, matching `Content-Range`, same
//! strong ETag); otherwise the failure that triggered the resume is surfaced.

mod dispatcher;
mod session;
mod validate;

pub use dispatcher::RetryDispatcher;
pub use session::{ResumeState, RetrySession};
pub use validate::{strong_etag, validate_resumed, Checkpoint, ValidationError, ValidationErrorKind};
