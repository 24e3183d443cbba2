//! CLI command handlers.

mod get;
mod prune;

use anyhow::Result;
use reget_core::cache::CacheStore;
use reget_core::config::CacheConfig;
use std::time::Duration;

pub use get::run_get;
#[cfg(test)]
pub(crate) use get::parse_header;
pub use prune::run_prune;

/// Open the configured cache database.
async fn open_store(cfg: &CacheConfig) -> Result<CacheStore> {
    let path = match &cfg.path {
        Some(p) => p.clone(),
        None => CacheStore::default_path()?,
    };
    let store = CacheStore::open_at(&path)
        .await?
        .with_prune_interval(Duration::from_secs(cfg.prune_interval_secs));
    Ok(store)
}
