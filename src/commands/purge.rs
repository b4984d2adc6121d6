//! Purge-cache command.

use anyhow::{Context, Result};
use tracing::info;

use super::pipeline::open_cache;
use crate::app_config::AppConfig;

/// Drops every cached no-match verdict. Needs no API key.
pub async fn run_purge_cache_command(app: &AppConfig) -> Result<()> {
    let config = &app.resolver;
    let cache = open_cache(&config.cache_path, config.cache_policy()).await?;
    let purged = cache.purge_unresolved().await;
    cache
        .flush()
        .await
        .context("Failed to write lookup cache")?;
    info!(purged, remaining = cache.len().await, "cache purged");
    println!(
        "Removed {purged} cached no-match entries from {}",
        config.cache_path.display()
    );
    Ok(())
}
