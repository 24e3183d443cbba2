//! Entry insertion and admission.

use http::{HeaderMap, StatusCode};

use super::super::admission::admit;
use super::super::db::CacheStore;
use super::super::error::StoreError;
use super::super::types::{headers_to_json, CacheKey, CacheValue, EntryId};

impl CacheStore {
    /// Insert a new row for `key`. Existing rows are never updated, so
    /// overlapping entries for one resource may coexist.
    pub async fn insert(&self, key: &CacheKey, value: &CacheValue) -> Result<EntryId, StoreError> {
        key.validate()?;
        value.validate()?;
        self.maybe_prune().await?;

        let headers = headers_to_json(&value.headers)?;
        let cache_control = serde_json::to_string(&value.cache_control)?;
        let vary = serde_json::to_string(&value.vary)?;

        let row_id = sqlx::query(
            r#"
            INSERT INTO cache_entries (
                url, method, body, byte_start, byte_end, delete_at,
                status_code, status_message, headers, cache_control,
                etag, vary, cached_at, stale_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(key.url())
        .bind(key.method.as_str())
        .bind(value.body.as_deref())
        .bind(value.start as i64)
        .bind(value.end as i64)
        .bind(value.delete_at)
        .bind(i64::from(value.status.as_u16()))
        .bind(value.status_message.as_str())
        .bind(headers)
        .bind(cache_control)
        .bind(value.etag.as_deref())
        .bind(vary)
        .bind(value.cached_at)
        .bind(value.stale_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(row_id)
    }

    /// Store `key`'s response if its headers pass admission. Returns the new
    /// row id, or None when the response is not cacheable.
    pub async fn admit_and_store(
        &self,
        key: &CacheKey,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Option<EntryId>, StoreError> {
        key.validate()?;
        match admit(key, status, headers, self.now_ms()) {
            Ok(value) => {
                let id = self.insert(key, &value).await?;
                tracing::debug!(
                    "cached {} {} as entry {} until {}",
                    key.method,
                    key.url(),
                    id,
                    value.delete_at
                );
                Ok(Some(id))
            }
            Err(refusal) => {
                tracing::debug!("not caching {} {}: {}", key.method, key.url(), refusal);
                Ok(None)
            }
        }
    }
}
