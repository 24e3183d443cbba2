//! `Dispatch` decorator that retries failed requests and resumes interrupted
//! bodies with conditional range requests.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use super::session::{ResumeState, RetrySession};
use super::validate::validate_resumed;
use crate::dispatch::{AbortHandle, Dispatch, FlowHandle, RequestOptions, ResponseHandler};
use crate::error::{HttpError, StatusError};
use crate::retry::{classify_status, ErrorKind, RetryPolicy, TransportError, TransportErrorKind};

/// Wraps a dispatcher so that failures are retried per [`RetryPolicy`] and
/// interrupted bodies continue where they stopped.
///
/// The caller sees a single `on_connect`, a single `on_headers` and one
/// continuous byte stream, however many attempts it took. At most one attempt
/// is in flight per logical request. Attempts share the request's
/// [`FlowHandle`], so a pause requested by the caller holds across a resume.
pub struct RetryDispatcher<D> {
    inner: D,
    policy: RetryPolicy,
}

impl<D> RetryDispatcher<D> {
    pub fn new(inner: D, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

enum Outcome {
    Complete(HeaderMap),
    Upgraded,
    Failed(HttpError),
}

#[async_trait]
impl<D: Dispatch> Dispatch for RetryDispatcher<D> {
    async fn dispatch(&self, request: RequestOptions, handler: &mut dyn ResponseHandler) {
        let mut session = RetrySession::new(request);
        let mut next = session.initial_request();

        loop {
            let outcome = {
                let mut attempt = AttemptHandler {
                    session: &mut session,
                    downstream: &mut *handler,
                    abort: None,
                    outcome: None,
                };
                self.inner.dispatch(next, &mut attempt).await;
                attempt.outcome.take()
            };

            let err = match outcome {
                Some(Outcome::Complete(trailers)) => {
                    session.mark_complete();
                    handler.on_complete(&trailers);
                    return;
                }
                Some(Outcome::Upgraded) => return,
                Some(Outcome::Failed(err)) => err,
                None => HttpError::Transport(TransportError::new(
                    TransportErrorKind::Other,
                    "dispatcher finished without a terminal callback",
                )),
            };

            match session.next_request(err, &self.policy).await {
                Ok(req) => next = req,
                Err(err) => {
                    if !session.connected {
                        session.connected = true;
                        handler.on_connect(session.logical().clone());
                    }
                    handler.on_error(err);
                    return;
                }
            }
        }
    }
}

/// Handler for one attempt; filters and forwards to the caller's handler.
struct AttemptHandler<'a> {
    session: &'a mut RetrySession,
    downstream: &'a mut dyn ResponseHandler,
    abort: Option<AbortHandle>,
    outcome: Option<Outcome>,
}

impl AttemptHandler<'_> {
    fn abort_attempt(&mut self, reason: HttpError) {
        match &self.abort {
            Some(a) => a.abort(reason),
            None => self.outcome = Some(Outcome::Failed(reason)),
        }
    }

    /// Retryable status on a response we have not forwarded yet.
    fn intercept_status(&self, status: StatusCode) -> bool {
        self.session.retry_allowed() && classify_status(status) == ErrorKind::Throttled
    }
}

impl ResponseHandler for AttemptHandler<'_> {
    fn on_connect(&mut self, abort: AbortHandle) {
        self.abort = Some(abort);
        if !self.session.connected {
            self.session.connected = true;
            self.downstream.on_connect(self.session.logical().clone());
        }
    }

    fn on_upgrade(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.session.mark_complete();
        self.downstream.on_upgrade(status, headers);
        self.outcome = Some(Outcome::Upgraded);
    }

    fn on_headers(&mut self, status: StatusCode, headers: &HeaderMap, flow: &FlowHandle) {
        match self.session.state {
            ResumeState::ValidatingResumedHeaders => {
                let checked = self
                    .session
                    .checkpoint()
                    .map(|cp| validate_resumed(&cp, status, headers));
                match checked {
                    Some(Ok(range)) => {
                        tracing::debug!(
                            "resumed at {} (range {}-{})",
                            self.session.pos,
                            range.start,
                            range.end
                        );
                        self.session.state = ResumeState::Streaming;
                    }
                    other => {
                        if let Some(Err(e)) = other {
                            tracing::warn!("{}", e);
                        }
                        let original = self.session.poison();
                        self.abort_attempt(original);
                    }
                }
            }
            ResumeState::AwaitingHeaders if !self.session.headers_sent => {
                if self.intercept_status(status) {
                    self.session.state = ResumeState::Deciding;
                    let err = HttpError::Status(StatusError::new(status, headers.clone()));
                    self.abort_attempt(err);
                    return;
                }
                self.session.record_first_response(status, headers);
                self.downstream.on_headers(status, headers, flow);
            }
            state => {
                tracing::debug!("ignoring headers in state {:?}", state);
            }
        }
    }

    fn on_data(&mut self, chunk: Bytes) -> bool {
        if self.session.state != ResumeState::Streaming {
            return true;
        }
        self.session.pos += chunk.len() as u64;
        self.downstream.on_data(chunk)
    }

    fn on_complete(&mut self, trailers: &HeaderMap) {
        if let Some(a) = &self.abort {
            if a.is_aborted() {
                self.outcome = Some(Outcome::Failed(a.take_reason()));
                return;
            }
        }
        if self.outcome.is_none() {
            self.outcome = Some(Outcome::Complete(trailers.clone()));
        }
    }

    fn on_error(&mut self, err: HttpError) {
        if self.outcome.is_none() {
            self.outcome = Some(Outcome::Failed(err));
        }
    }
}
