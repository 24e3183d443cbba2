//! Error surface seen by callers of a [`Dispatch`](crate::dispatch::Dispatch).

use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::cache::StoreError;
use crate::retry::TransportError;

/// Terminal error delivered through `ResponseHandler::on_error`.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Status(#[from] StatusError),
    /// The logical request was aborted (signal fired or `AbortHandle::abort`).
    #[error("request aborted")]
    Cancelled,
    /// A one-shot request body was already consumed and cannot be sent again.
    #[error("request body already consumed")]
    BodyDisturbed,
    #[error("cache store: {0}")]
    Store(Arc<StoreError>),
}

impl HttpError {
    /// HTTP status carried by the error, if it is a status error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status(e) => Some(e.status),
            _ => None,
        }
    }
}

impl From<StoreError> for HttpError {
    fn from(e: StoreError) -> Self {
        HttpError::Store(Arc::new(e))
    }
}

/// Parsed body attached to a [`StatusError`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusBody {
    Json(serde_json::Value),
    Text(String),
}

/// HTTP status >= 400 surfaced as a typed error.
#[derive(Debug, Clone, Error)]
#[error("HTTP {status}")]
pub struct StatusError {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<StatusBody>,
}

impl StatusError {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            body: None,
        }
    }

    /// Attach a body, decoded by content type: JSON types become
    /// `StatusBody::Json`, `text/*` becomes `StatusBody::Text`, anything else
    /// (or an undecodable payload) is dropped.
    pub fn with_body(mut self, raw: &[u8]) -> Self {
        let content_type = self
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();
        let mime = content_type.split(';').next().unwrap_or("").trim();

        self.body = if mime == "application/json" || mime.ends_with("+json") {
            serde_json::from_slice(raw).ok().map(StatusBody::Json)
        } else if mime.starts_with("text/") {
            Some(StatusBody::Text(String::from_utf8_lossy(raw).into_owned()))
        } else {
            None
        };
        self
    }
}
