//! Wiring shared by the commands that talk to TMDB.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use titlesync_core::{
    CachePolicy, ConfigError, Database, LookupCache, MatchResolver, PoolOutcome, RateLimiter,
    RawEntry, ResolutionPool, TmdbProvider,
};
use tracing::{debug, info};

use crate::app_config::AppConfig;
use crate::progress;

/// Opens the lookup cache at `path`, creating the database when missing.
pub(crate) async fn open_cache(path: &Path, policy: CachePolicy) -> Result<Arc<LookupCache>> {
    let db = Database::new(path)
        .await
        .with_context(|| format!("Failed to open lookup cache '{}'", path.display()))?;
    let cache = LookupCache::load(db, policy)
        .await
        .context("Failed to load lookup cache")?;
    Ok(Arc::new(cache))
}

/// Cache, resolver and pool built from one configuration.
pub(crate) struct Pipeline {
    pub(crate) cache: Arc<LookupCache>,
    pub(crate) pool: ResolutionPool,
}

impl Pipeline {
    /// Validates the configuration and builds the pipeline.
    ///
    /// Configuration errors surface here, before any remote call.
    pub(crate) async fn open(app: &AppConfig) -> Result<Self> {
        let config = &app.resolver;
        config.validate()?;
        let api_key = config
            .api_key()
            .ok_or(ConfigError::MissingApiKey)?;

        let limiter = Arc::new(RateLimiter::per_second(config.requests_per_second));
        if limiter.is_disabled() {
            debug!("rate limiting disabled");
        } else {
            debug!(rps = config.requests_per_second, "rate limiting enabled");
        }

        let provider = match app.tmdb_base_url.as_deref() {
            Some(base_url) => TmdbProvider::with_base_url(api_key, base_url, limiter)?,
            None => TmdbProvider::new(api_key, limiter)?,
        };

        let cache = open_cache(&config.cache_path, config.cache_policy()).await?;
        let resolver = Arc::new(
            MatchResolver::new(Arc::clone(&cache), Arc::new(provider))
                .with_retry_policy(config.retry_policy())
                .with_thresholds(config.thresholds),
        );
        let pool = ResolutionPool::new(Arc::clone(&resolver), config.pool_options())?;

        Ok(Self { cache, pool })
    }

    /// Resolves `entries` with a progress bar, stopping dispatch when
    /// `interrupted` is raised.
    pub(crate) async fn resolve(
        &self,
        entries: Vec<RawEntry>,
        interrupted: Arc<AtomicBool>,
        quiet: bool,
    ) -> Result<PoolOutcome> {
        let total = entries.len();
        let (progress_handle, progress_stop) =
            progress::spawn_progress_ui(progress::progress_enabled(quiet), self.pool.stats(), total);

        let outcome = self
            .pool
            .resolve_all_interruptible(entries, interrupted)
            .await;

        progress_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = progress_handle {
            let _ = handle.await;
        }
        Ok(outcome?)
    }

    /// Persists the cache.
    pub(crate) async fn finish(&self) -> Result<()> {
        let rows = self
            .cache
            .flush()
            .await
            .context("Failed to write lookup cache")?;
        let stats = self.cache.stats();
        let resolver = self.pool.resolver();
        info!(
            rows,
            hits = stats.hits,
            misses = stats.misses,
            provider_calls = resolver.provider_calls(),
            retries = resolver.retries(),
            "run finished"
        );
        Ok(())
    }
}

/// Raises the returned flag on Ctrl-C.
pub(crate) fn install_interrupt_handler() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });
    interrupted
}

