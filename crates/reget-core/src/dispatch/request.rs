//! Request description passed through the dispatcher stack.

use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio_util::sync::CancellationToken;

use super::FlowHandle;
use crate::retry::RetryFn;

/// Request body. `Full` can be replayed on retry; `Once` can be read a single
/// time and is *disturbed* afterwards.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Full(Bytes),
    Once(OnceBody),
}

impl RequestBody {
    pub fn is_disturbed(&self) -> bool {
        match self {
            RequestBody::Full(_) => false,
            RequestBody::Once(b) => b.is_disturbed(),
        }
    }

    /// Bytes to send, or None if a one-shot body was already taken.
    pub fn take(&self) -> Option<Bytes> {
        match self {
            RequestBody::Full(b) => Some(b.clone()),
            RequestBody::Once(b) => b.take(),
        }
    }
}

/// One-shot body shared between clones of the same request.
#[derive(Debug, Clone)]
pub struct OnceBody {
    inner: Arc<Mutex<Option<Bytes>>>,
}

impl OnceBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(data.into()))),
        }
    }

    pub fn take(&self) -> Option<Bytes> {
        self.inner.lock().ok().and_then(|mut b| b.take())
    }

    pub fn is_disturbed(&self) -> bool {
        self.inner.lock().map(|b| b.is_none()).unwrap_or(true)
    }
}

/// Per-request retry behaviour.
#[derive(Clone, Default)]
pub enum Retry {
    /// Use the dispatcher's [`RetryPolicy`](crate::retry::RetryPolicy).
    #[default]
    Default,
    /// Never retry or resume this request.
    Disabled,
    /// Custom decision function; may delegate to the default policy.
    Custom(RetryFn),
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retry::Default => write!(f, "Default"),
            Retry::Disabled => write!(f, "Disabled"),
            Retry::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Immutable description of one logical request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Scheme, host and port, e.g. `https://example.com:8443`.
    pub origin: String,
    /// Path plus query, e.g. `/file.bin?x=1`.
    pub path: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Cancellation signal for the whole logical request.
    pub signal: Option<CancellationToken>,
    pub retry: Retry,
    /// Overrides the method-based idempotency check.
    pub idempotent: Option<bool>,
    /// Body backpressure, shared by every attempt of this request.
    pub flow: FlowHandle,
}

impl RequestOptions {
    pub fn new(origin: impl Into<String>, path: impl Into<String>, method: Method) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
            method,
            headers: HeaderMap::new(),
            body: None,
            signal: None,
            retry: Retry::Default,
            idempotent: None,
            flow: FlowHandle::new(),
        }
    }

    /// Split an absolute URL into origin and path+query.
    pub fn from_url(method: Method, raw: &str) -> Result<Self> {
        let parsed = url::Url::parse(raw).context("invalid URL")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("unsupported URL scheme: {}", parsed.scheme());
        }
        let origin = parsed.origin().ascii_serialization();
        let mut path = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            path.push('?');
            path.push_str(q);
        }
        Ok(Self::new(origin, path, method))
    }

    /// `origin + path`, the cache identity and transport target.
    pub fn url(&self) -> String {
        format!("{}{}", self.origin, self.path)
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent.unwrap_or_else(|| {
            matches!(
                self.method,
                Method::GET
                    | Method::HEAD
                    | Method::OPTIONS
                    | Method::PUT
                    | Method::DELETE
                    | Method::TRACE
            )
        })
    }

    pub fn body_disturbed(&self) -> bool {
        self.body.as_ref().map(|b| b.is_disturbed()).unwrap_or(false)
    }
}
