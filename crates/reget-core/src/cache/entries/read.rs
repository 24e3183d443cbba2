//! Entry lookup.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::RANGE;
use http::{Method, StatusCode};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::CacheStore;
use super::super::error::StoreError;
use super::super::types::{headers_from_json, CacheEntry, CacheKey, CacheValue, VaryValue};
use crate::range::ByteRange;

impl CacheStore {
    /// First live entry for `key` whose byte window and vary constraints
    /// satisfy the request, soonest-expiring first.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        key.validate()?;
        self.maybe_prune().await?;

        let wanted = match key.headers.get(RANGE) {
            None => None,
            Some(v) => match v.to_str().ok().and_then(ByteRange::parse) {
                Some(r) => Some(r),
                None => {
                    tracing::debug!("cache skip {}: unsupported range {:?}", key.url(), v);
                    return Ok(None);
                }
            },
        };
        // Stored windows always fit in i64, so a larger start cannot match.
        let Ok(start) = i64::try_from(wanted.map_or(0, |r| r.start)) else {
            tracing::debug!("cache skip {}: range start out of bounds", key.url());
            return Ok(None);
        };
        let now = self.now_ms();

        let rows = sqlx::query(
            r#"
            SELECT id, url, method, body, byte_start, byte_end, delete_at,
                   status_code, status_message, headers, cache_control,
                   etag, vary, cached_at, stale_at
            FROM cache_entries
            WHERE url = ?1 AND method = ?2 AND byte_start <= ?3
            ORDER BY delete_at ASC, id ASC
            "#,
        )
        .bind(key.url())
        .bind(key.method.as_str())
        .bind(start)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let entry = entry_from_row(&row)?;
            let v = &entry.value;
            if v.delete_at <= now {
                continue;
            }
            let window_ok = match wanted {
                Some(r) => v.start == r.start && r.end.map_or(true, |end| v.end == end),
                None => v.start == 0 && v.status != StatusCode::PARTIAL_CONTENT,
            };
            if !window_ok {
                continue;
            }
            if !v
                .vary
                .iter()
                .all(|(name, want)| want.matches(&key.headers, name))
            {
                tracing::debug!("cache vary mismatch for {} (entry {})", entry.url, entry.id);
                continue;
            }
            tracing::debug!("cache hit {} {} (entry {})", entry.method, entry.url, entry.id);
            return Ok(Some(entry));
        }

        tracing::debug!("cache miss {} {}", key.method, key.url());
        Ok(None)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<CacheEntry, StoreError> {
    let id: i64 = row.try_get("id")?;
    let url: String = row.try_get("url")?;
    let method: String = row.try_get("method")?;
    let body: Option<Vec<u8>> = row.try_get("body")?;
    let start: i64 = row.try_get("byte_start")?;
    let end: i64 = row.try_get("byte_end")?;
    let status_code: i64 = row.try_get("status_code")?;
    let status_message: String = row.try_get("status_message")?;
    let headers: String = row.try_get("headers")?;
    let cache_control: String = row.try_get("cache_control")?;
    let etag: Option<String> = row.try_get("etag")?;
    let vary: String = row.try_get("vary")?;

    let corrupt = |what: &str| StoreError::InvalidValue(format!("entry {}: bad {}", id, what));
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| corrupt("method"))?;
    let status = u16::try_from(status_code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| corrupt("status"))?;
    let cache_control: BTreeMap<String, Option<String>> = serde_json::from_str(&cache_control)?;
    let vary: BTreeMap<String, VaryValue> = serde_json::from_str(&vary)?;

    Ok(CacheEntry {
        id,
        url,
        method,
        value: CacheValue {
            status,
            status_message,
            headers: headers_from_json(&headers)?,
            body: body.map(Bytes::from),
            start: u64::try_from(start).map_err(|_| corrupt("start"))?,
            end: u64::try_from(end).map_err(|_| corrupt("end"))?,
            cache_control,
            etag,
            vary,
            cached_at: row.try_get("cached_at")?,
            stale_at: row.try_get("stale_at")?,
            delete_at: row.try_get("delete_at")?,
        },
    })
}
