//! Per-logical-request resume state.

use http::header::{IF_MATCH, RANGE};
use http::{HeaderMap, HeaderValue, StatusCode};

use super::validate::{strong_etag, Checkpoint};
use crate::dispatch::{AbortHandle, RequestOptions, Retry};
use crate::error::HttpError;
use crate::range::{ByteRange, ContentRange};
use crate::retry::{backoff, evaluate, RetryDecision, RetryPolicy};

/// Where the logical request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    AwaitingHeaders,
    Streaming,
    Deciding,
    ValidatingResumedHeaders,
    Complete,
    Failed,
}

/// Mutable state of one logical request across all of its attempts.
#[derive(Debug)]
pub struct RetrySession {
    opts: RequestOptions,
    logical: AbortHandle,
    pub(super) state: ResumeState,
    /// Absolute offset of the next byte the caller has not seen.
    pub(super) pos: u64,
    /// Exclusive end of the window the caller expects.
    pub(super) end: Option<u64>,
    /// Complete entity length from the first response.
    pub(super) size: Option<u64>,
    /// Strong validator from the first response.
    pub(super) etag: Option<String>,
    /// Retries performed so far.
    pub(super) attempt: u32,
    pub(super) connected: bool,
    pub(super) headers_sent: bool,
    /// Error that triggered the attempt in flight; surfaced if that attempt
    /// cannot prove continuity.
    trigger: Option<HttpError>,
    poisoned: Option<HttpError>,
}

impl RetrySession {
    pub fn new(opts: RequestOptions) -> Self {
        let logical = AbortHandle::linked(opts.signal.as_ref());
        Self {
            opts,
            logical,
            state: ResumeState::AwaitingHeaders,
            pos: 0,
            end: None,
            size: None,
            etag: None,
            attempt: 0,
            connected: false,
            headers_sent: false,
            trigger: None,
            poisoned: None,
        }
    }

    /// Abort handle for the whole logical request (what the caller gets).
    pub fn logical(&self) -> &AbortHandle {
        &self.logical
    }

    pub fn state(&self) -> ResumeState {
        self.state
    }

    /// Whether a failure of this request may be retried at all.
    pub fn retry_allowed(&self) -> bool {
        !matches!(self.opts.retry, Retry::Disabled)
            && self.opts.is_idempotent()
            && !self.opts.body_disturbed()
    }

    /// The first attempt's request, bound to the logical signal.
    pub fn initial_request(&self) -> RequestOptions {
        let mut req = self.opts.clone();
        req.signal = Some(self.logical.token().clone());
        req
    }

    /// Record validator and length from the first forwarded response.
    pub(super) fn record_first_response(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.headers_sent = true;
        self.state = ResumeState::Streaming;

        match status {
            StatusCode::PARTIAL_CONTENT => {
                match headers
                    .get(http::header::CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(ContentRange::parse)
                {
                    Some(range) => {
                        self.pos = range.start;
                        self.end = Some(range.end);
                        self.size = range.size;
                        self.etag = strong_etag(headers);
                    }
                    // No way to express a continuation without a range.
                    None => self.etag = None,
                }
            }
            StatusCode::OK => {
                let len = headers
                    .get(http::header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                self.end = len;
                self.size = len;
                self.etag = strong_etag(headers);
            }
            _ => self.etag = None,
        }

        tracing::debug!(
            "first response {}: etag={:?} end={:?} size={:?}",
            status.as_u16(),
            self.etag,
            self.end,
            self.size
        );
    }

    /// Continuation point for validating a resumed response.
    pub(super) fn checkpoint(&self) -> Option<Checkpoint> {
        Some(Checkpoint {
            pos: self.pos,
            end: self.end,
            size: self.size,
            etag: self.etag.clone()?,
        })
    }

    /// A resumed response failed validation: stop retrying and surface the
    /// failure that triggered the resume.
    pub(super) fn poison(&mut self) -> HttpError {
        let original = self.trigger.clone().unwrap_or(HttpError::Cancelled);
        self.poisoned = Some(original.clone());
        original
    }

    pub(super) fn mark_complete(&mut self) {
        self.state = ResumeState::Complete;
    }

    /// Decide what to do about `err`: the next request to dispatch, or the
    /// error to surface. Waits out the backoff (cancellable) before returning.
    pub async fn next_request(
        &mut self,
        err: HttpError,
        policy: &RetryPolicy,
    ) -> Result<RequestOptions, HttpError> {
        self.state = ResumeState::Deciding;

        if self.logical.is_aborted() {
            self.state = ResumeState::Failed;
            return Err(self.logical.take_reason());
        }
        if let Some(original) = self.poisoned.take() {
            self.state = ResumeState::Failed;
            return Err(original);
        }
        if !self.retry_allowed() {
            self.state = ResumeState::Failed;
            return Err(err);
        }

        let resume = self.headers_sent;
        let request = if resume {
            match self.resume_request() {
                Some(r) => r,
                None => {
                    tracing::debug!("not resumable after {} bytes: {}", self.pos, err);
                    self.state = ResumeState::Failed;
                    return Err(err);
                }
            }
        } else {
            self.initial_request()
        };

        match evaluate(&err, self.attempt, &self.opts, policy) {
            RetryDecision::GiveUp => {
                self.state = ResumeState::Failed;
                return Err(err);
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::debug!(
                    "retry {} of {} in {}ms (resume={}, pos={}): {}",
                    self.attempt + 1,
                    self.opts.url(),
                    delay.as_millis(),
                    resume,
                    self.pos,
                    err
                );
                if backoff(delay, self.logical.token()).await.is_err() {
                    self.state = ResumeState::Failed;
                    return Err(self.logical.take_reason());
                }
            }
        }

        self.attempt += 1;
        self.trigger = Some(err);
        self.state = if resume {
            ResumeState::ValidatingResumedHeaders
        } else {
            ResumeState::AwaitingHeaders
        };
        Ok(request)
    }

    /// Original request plus `If-Match` and `Range` for the undelivered tail.
    /// None when there is nothing to resume from.
    fn resume_request(&self) -> Option<RequestOptions> {
        let etag = self.etag.as_deref()?;
        if let Some(end) = self.end {
            if self.pos >= end {
                return None;
            }
        }
        let range = ByteRange {
            start: self.pos,
            end: self.end,
        };

        let mut req = self.initial_request();
        req.headers.insert(IF_MATCH, HeaderValue::from_str(etag).ok()?);
        req.headers
            .insert(RANGE, HeaderValue::from_str(&range.header_value()).ok()?);
        Some(req)
    }
}
