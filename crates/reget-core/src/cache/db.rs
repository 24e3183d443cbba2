//! SQLite-backed response cache.
//!
//! Handles connection, migrations, and the prune window. Entry reads and
//! writes live in `entries`.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use super::error::StoreError;
use crate::clock::{Clock, SystemClock};

/// Default gap between two prune passes.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the persistent response cache.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/reget/cache.db` by default. Rows are insert-only; the only
/// deletions are expiry prunes.
#[derive(Clone)]
pub struct CacheStore {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) clock: Arc<dyn Clock>,
    prune_interval: Duration,
    /// Clock reading of the last prune pass, shared between clones.
    last_prune: Arc<Mutex<Option<i64>>>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("clock", &self.clock)
            .field("prune_interval", &self.prune_interval)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            last_prune: Arc::new(Mutex::new(None)),
        }
    }

    /// Default on-disk location: `$XDG_STATE_HOME/reget/cache.db`.
    pub fn default_path() -> Result<std::path::PathBuf> {
        Ok(crate::config::state_dir()?.join("cache.db"))
    }

    /// Open (or create) the default cache database and run migrations.
    pub async fn open_default() -> Result<Self> {
        Self::open_at(Self::default_path()?).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await
            .with_context(|| format!("opening cache at {}", path.display()))?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        tracing::info!("cache store opened at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory cache (nothing touches disk).
    pub async fn open_memory() -> Result<Self> {
        // Every connection to `sqlite::memory:` is its own database, so the
        // single connection must never be recycled.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Close the pool. Later operations fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        // `vary`, `headers` and `cache_control` hold JSON.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                body BLOB,
                byte_start INTEGER NOT NULL,
                byte_end INTEGER NOT NULL,
                delete_at INTEGER NOT NULL,
                status_code INTEGER NOT NULL,
                status_message TEXT NOT NULL,
                headers TEXT NOT NULL,
                cache_control TEXT NOT NULL,
                etag TEXT,
                vary TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                stale_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS cache_entries_lookup
                ON cache_entries (url, method, byte_start, delete_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS cache_entries_expiry
                ON cache_entries (delete_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete every row whose hard expiry has passed. Returns rows removed.
    pub async fn prune(&self) -> Result<u64, StoreError> {
        let now = self.now_ms();
        let removed = sqlx::query("DELETE FROM cache_entries WHERE delete_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            tracing::info!("pruned {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Prune unless a pass already ran within the prune interval.
    pub(crate) async fn maybe_prune(&self) -> Result<(), StoreError> {
        let now = self.now_ms();
        {
            let mut last = self
                .last_prune
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let window = self.prune_interval.as_millis() as i64;
            if matches!(*last, Some(at) if now - at < window) {
                return Ok(());
            }
            *last = Some(now);
        }
        self.prune().await.map(|_| ())
    }
}
