//! Abort handle handed to `ResponseHandler::on_connect`.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::HttpError;

/// Cancels one dispatch (or one logical request) with an optional reason.
///
/// Dispatchers watch [`AbortHandle::aborted`] and, once it fires, deliver
/// `on_error` with [`AbortHandle::take_reason`].
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
    reason: Arc<Mutex<Option<HttpError>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that also fires when `parent` is cancelled.
    pub fn linked(parent: Option<&CancellationToken>) -> Self {
        let token = match parent {
            Some(p) => p.child_token(),
            None => CancellationToken::new(),
        };
        Self::from_token(token)
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Abort with `reason`. The first reason wins.
    pub fn abort(&self, reason: HttpError) {
        if let Ok(mut slot) = self.reason.lock() {
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the handle (or its parent signal) is cancelled.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }

    /// Reason passed to `abort`, or `Cancelled` when the signal fired without one.
    pub fn take_reason(&self) -> HttpError {
        self.reason
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or(HttpError::Cancelled)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
