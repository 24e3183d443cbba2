//! `reget prune` – delete expired cache rows.

use anyhow::Result;
use reget_core::config::RegetConfig;

use super::open_store;

pub async fn run_prune(cfg: &RegetConfig) -> Result<()> {
    let store = open_store(&cfg.cache).await?;
    let removed = store.prune().await?;
    store.close().await;
    println!("Removed {} expired cache entries.", removed);
    Ok(())
}
