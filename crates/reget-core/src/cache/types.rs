//! Cache key and entry types, plus their row encodings.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use crate::dispatch::RequestOptions;

/// Row id of a stored entry.
pub type EntryId = i64;

/// What a cached response is looked up by.
#[derive(Debug, Clone)]
pub struct CacheKey {
    /// `scheme://host[:port]`
    pub origin: String,
    pub method: Method,
    /// Path plus query, starting with `/`.
    pub path: String,
    /// Request headers; consulted for `Range` and vary matching.
    pub headers: HeaderMap,
}

impl CacheKey {
    pub fn from_request(req: &RequestOptions) -> Self {
        Self {
            origin: req.origin.clone(),
            method: req.method.clone(),
            path: req.path.clone(),
            headers: req.headers.clone(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.origin, self.path)
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.origin.is_empty() {
            return Err(StoreError::InvalidKey("origin is empty".into()));
        }
        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            return Err(StoreError::InvalidKey(format!(
                "origin is not http(s): {}",
                self.origin
            )));
        }
        if !self.path.starts_with('/') {
            return Err(StoreError::InvalidKey(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        Ok(())
    }
}

/// Recorded request header value(s) for one `Vary` name. A single header
/// line is stored as a string, repeated lines as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VaryValue {
    One(String),
    Many(Vec<String>),
}

impl VaryValue {
    /// Value(s) of `name` in `headers`, or None when absent.
    pub fn capture(headers: &HeaderMap, name: &str) -> Option<Self> {
        let mut values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        match values.len() {
            0 => None,
            1 => values.pop().map(VaryValue::One),
            _ => Some(VaryValue::Many(values)),
        }
    }

    /// Byte-for-byte comparison against a new request's headers.
    pub fn matches(&self, headers: &HeaderMap, name: &str) -> bool {
        let got: Vec<&[u8]> = headers.get_all(name).iter().map(|v| v.as_bytes()).collect();
        match self {
            VaryValue::One(want) => got.len() == 1 && got[0] == want.as_bytes(),
            VaryValue::Many(want) => {
                got.len() == want.len() && got.iter().zip(want).all(|(g, w)| *g == w.as_bytes())
            }
        }
    }
}

/// Everything stored for one admitted response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheValue {
    pub status: StatusCode,
    pub status_message: String,
    pub headers: HeaderMap,
    /// Stored body bytes. Admission only accepts bodyless responses, so this
    /// is None for everything the dispatcher writes.
    pub body: Option<Bytes>,
    /// Byte window `[start, end)` the entry represents.
    pub start: u64,
    pub end: u64,
    /// Parsed `Cache-Control` directives (lowercase names).
    pub cache_control: BTreeMap<String, Option<String>>,
    pub etag: Option<String>,
    /// Lowercase header name to recorded request value.
    pub vary: BTreeMap<String, VaryValue>,
    pub cached_at: i64,
    pub stale_at: i64,
    pub delete_at: i64,
}

impl CacheValue {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.status.as_u16() >= 600 {
            return Err(StoreError::InvalidValue(format!(
                "status out of range: {}",
                self.status
            )));
        }
        if self.end < self.start {
            return Err(StoreError::InvalidValue(format!(
                "end {} before start {}",
                self.end, self.start
            )));
        }
        if let Some(body) = &self.body {
            if body.len() as u64 != self.end - self.start {
                return Err(StoreError::InvalidValue(format!(
                    "body is {} bytes but window is {}",
                    body.len(),
                    self.end - self.start
                )));
            }
        }
        if self.delete_at <= self.cached_at {
            return Err(StoreError::InvalidValue(
                "deleteAt must be after cachedAt".into(),
            ));
        }
        if self.stale_at > self.delete_at {
            return Err(StoreError::InvalidValue(
                "staleAt must not be after deleteAt".into(),
            ));
        }
        if i64::try_from(self.end).is_err() {
            return Err(StoreError::InvalidValue("end does not fit a row".into()));
        }
        Ok(())
    }

    /// Entry is past its `max-age` but still served until `delete_at`.
    pub fn is_stale(&self, now_ms: i64) -> bool {
        now_ms >= self.stale_at
    }
}

/// A stored entry as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub id: EntryId,
    pub url: String,
    pub method: Method,
    pub value: CacheValue,
}

/// Headers are stored as an ordered list of pairs so duplicates survive.
pub(crate) fn headers_to_json(headers: &HeaderMap) -> Result<String, StoreError> {
    let pairs: Vec<(&str, String)> = headers
        .iter()
        .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    Ok(serde_json::to_string(&pairs)?)
}

pub(crate) fn headers_from_json(raw: &str) -> Result<HeaderMap, StoreError> {
    let pairs: Vec<(String, String)> = serde_json::from_str(raw)?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (k, v) in pairs {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| StoreError::InvalidValue(format!("stored header name {:?}: {}", k, e)))?;
        let value = HeaderValue::from_str(&v)
            .map_err(|e| StoreError::InvalidValue(format!("stored header {}: {}", k, e)))?;
        headers.append(name, value);
    }
    Ok(headers)
}
