//! Decides whether a response may be stored, and with what lifetime.

use std::collections::BTreeMap;

use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, ETAG, VARY};
use http::{HeaderMap, StatusCode};

use super::types::{CacheKey, CacheValue, VaryValue};
use crate::range::ContentRange;

/// TTL granted by `immutable`.
pub const IMMUTABLE_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Directives that rule out storing a response.
const FORBIDDEN: [&str; 6] = [
    "private",
    "no-store",
    "no-cache",
    "must-understand",
    "must-revalidate",
    "proxy-revalidate",
];

/// Why a response was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    HasBody,
    NotPublic,
    Forbidden(&'static str),
    VaryWildcard,
    VaryFieldMissing(String),
    NoLifetime,
    BadContentRange,
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Refusal::HasBody => f.write_str("response has a body"),
            Refusal::NotPublic => f.write_str("not marked public"),
            Refusal::Forbidden(d) => write!(f, "cache-control {}", d),
            Refusal::VaryWildcard => f.write_str("vary: *"),
            Refusal::VaryFieldMissing(name) => write!(f, "request lacks vary field {}", name),
            Refusal::NoLifetime => f.write_str("no positive max-age"),
            Refusal::BadContentRange => f.write_str("unparseable content-range"),
        }
    }
}

/// Parse every `Cache-Control` line into lowercase directive names with
/// optional unquoted values. Later duplicates win.
pub fn parse_cache_control(headers: &HeaderMap) -> BTreeMap<String, Option<String>> {
    let mut out = BTreeMap::new();
    for line in headers.get_all(CACHE_CONTROL) {
        let Ok(line) = line.to_str() else { continue };
        for part in line.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((k, v)) => {
                    let v = v.trim().trim_matches('"').to_string();
                    out.insert(k.trim().to_ascii_lowercase(), Some(v));
                }
                None => {
                    out.insert(part.to_ascii_lowercase(), None);
                }
            }
        }
    }
    out
}

/// Lowercase field names listed across all `Vary` lines.
fn vary_fields(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|f| f.trim().to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

fn directive_secs(directives: &BTreeMap<String, Option<String>>, name: &str) -> Option<i64> {
    directives
        .get(name)?
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Build the value to store for `key`'s response, or say why not.
pub fn admit(
    key: &CacheKey,
    status: StatusCode,
    headers: &HeaderMap,
    now_ms: i64,
) -> Result<CacheValue, Refusal> {
    let len = content_length(headers);
    if len.unwrap_or(0) != 0 {
        return Err(Refusal::HasBody);
    }

    let cache_control = parse_cache_control(headers);
    if !cache_control.contains_key("public") {
        return Err(Refusal::NotPublic);
    }
    if let Some(d) = FORBIDDEN.iter().find(|d| cache_control.contains_key(**d)) {
        return Err(Refusal::Forbidden(*d));
    }

    let mut vary = BTreeMap::new();
    for field in vary_fields(headers) {
        if field == "*" {
            return Err(Refusal::VaryWildcard);
        }
        match VaryValue::capture(&key.headers, &field) {
            Some(v) => {
                vary.insert(field, v);
            }
            None => return Err(Refusal::VaryFieldMissing(field)),
        }
    }

    let max_age = directive_secs(&cache_control, "max-age");
    let ttl = if cache_control.contains_key("immutable") {
        IMMUTABLE_TTL_SECS
    } else {
        directive_secs(&cache_control, "s-maxage")
            .or(max_age)
            .ok_or(Refusal::NoLifetime)?
    };
    if ttl <= 0 {
        return Err(Refusal::NoLifetime);
    }
    let ttl_ms = ttl.saturating_mul(1000);
    let stale_ms = max_age
        .filter(|s| *s >= 0)
        .map(|s| s.saturating_mul(1000).min(ttl_ms))
        .unwrap_or(ttl_ms);

    let (start, end) = match headers.get(CONTENT_RANGE) {
        Some(v) => {
            let range = v
                .to_str()
                .ok()
                .and_then(ContentRange::parse)
                .ok_or(Refusal::BadContentRange)?;
            (range.start, range.end)
        }
        None => (0, len.unwrap_or(0)),
    };

    Ok(CacheValue {
        status,
        status_message: status.canonical_reason().unwrap_or_default().to_string(),
        headers: headers.clone(),
        body: None,
        start,
        end,
        cache_control,
        etag: headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        vary,
        cached_at: now_ms,
        stale_at: now_ms.saturating_add(stale_ms),
        delete_at: now_ms.saturating_add(ttl_ms),
    })
}
