//! Bounded-concurrency resolution of many raw entries.
//!
//! The [`ResolutionPool`] fans entries out over a fixed number of workers, each
//! running one [`MatchResolver`] call at a time. Entries sharing a [`CacheKey`] are
//! coalesced into a single lookup. Every input yields exactly one output: a
//! [`ResolutionRecord`], or, after cancellation, a place in
//! [`PoolOutcome::pending`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use titlesync_core::provider::{RateLimiter, TmdbProvider};
//! use titlesync_core::{
//!     CachePolicy, LookupCache, MatchResolver, PoolOptions, RawEntry, ResolutionPool,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(TmdbProvider::new("api-key", Arc::new(RateLimiter::per_second(4.0)))?);
//! let cache = Arc::new(LookupCache::ephemeral(CachePolicy::default()));
//! let resolver = Arc::new(MatchResolver::new(cache, provider));
//! let pool = ResolutionPool::new(resolver, PoolOptions::default())?;
//!
//! let outcome = pool
//!     .resolve_all(vec![RawEntry::new("Inception", "list"), RawEntry::new("Heat", "list")])
//!     .await?;
//! println!("{} records", outcome.records.len());
//! # Ok(())
//! # }
//! ```

mod coalesce;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::model::{CacheKey, RawEntry, ResolutionRecord, ResolutionStatus, UnresolvedReason};
use crate::resolver::{MatchResolver, Verdict};

use coalesce::{Claim, InFlight};

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 64;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 4;

/// How long in-flight lookups may finish after cancellation.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a worker slot wait checks the cancellation flag.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Worker count outside the allowed range.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The rejected value.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("worker semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Pool sizing and shutdown behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Grace period for in-flight lookups once cancellation is raised.
    pub drain_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Live counters for a pool.
///
/// Updated by worker tasks as records complete, so a progress display can poll
/// them while a run is in progress.
#[derive(Debug, Default)]
pub struct PoolStats {
    resolved: AtomicUsize,
    ambiguous: AtomicUsize,
    no_match: AtomicUsize,
    provider_error: AtomicUsize,
    cache_hits: AtomicUsize,
    coalesced: AtomicUsize,
}

impl PoolStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Freshly resolved entries.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Ambiguous entries.
    #[must_use]
    pub fn ambiguous(&self) -> usize {
        self.ambiguous.load(Ordering::SeqCst)
    }

    /// Entries with no matching candidate.
    #[must_use]
    pub fn no_match(&self) -> usize {
        self.no_match.load(Ordering::SeqCst)
    }

    /// Entries whose provider calls kept failing.
    #[must_use]
    pub fn provider_error(&self) -> usize {
        self.provider_error.load(Ordering::SeqCst)
    }

    /// Entries answered from the lookup cache.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::SeqCst)
    }

    /// Entries that shared another entry's lookup.
    #[must_use]
    pub fn coalesced(&self) -> usize {
        self.coalesced.load(Ordering::SeqCst)
    }

    /// Total records produced.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.resolved() + self.ambiguous() + self.no_match() + self.provider_error() + self.cache_hits()
    }

    fn record(&self, record: &ResolutionRecord) {
        let counter = match record.status {
            ResolutionStatus::Resolved => &self.resolved,
            ResolutionStatus::Ambiguous => &self.ambiguous,
            ResolutionStatus::Unresolved(UnresolvedReason::NoMatch) => &self.no_match,
            ResolutionStatus::Unresolved(UnresolvedReason::ProviderError) => &self.provider_error,
            ResolutionStatus::CacheHit => &self.cache_hits,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::SeqCst);
    }
}

/// Result of a pool run.
#[derive(Debug, Clone)]
pub struct PoolOutcome {
    /// One record per processed entry, in completion order.
    pub records: Vec<ResolutionRecord>,
    /// Entries never processed because the run was cancelled.
    pub pending: Vec<RawEntry>,
    /// Whether the cancellation flag was raised during the run.
    pub interrupted: bool,
}

impl PoolOutcome {
    /// Number of inputs accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.records.len() + self.pending.len()
    }
}

/// Bounded worker pool driving a shared [`MatchResolver`].
///
/// # Concurrency Model
///
/// - Each entry runs in its own Tokio task
/// - A task that runs a lookup holds a semaphore permit for its lifetime (RAII)
/// - Entries with the same [`CacheKey`] await one shared lookup without taking a
///   permit, so duplicates never starve distinct titles of workers
/// - The provider's [`RateLimiter`](crate::provider::RateLimiter) bounds the
///   request rate independently of the worker count
#[derive(Debug)]
pub struct ResolutionPool {
    resolver: Arc<MatchResolver>,
    semaphore: Arc<Semaphore>,
    options: PoolOptions,
    stats: Arc<PoolStats>,
}

impl ResolutionPool {
    /// Creates a pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidWorkers`] if `options.workers` is outside
    /// `1..=64`.
    #[instrument(level = "debug", skip(resolver))]
    pub fn new(resolver: Arc<MatchResolver>, options: PoolOptions) -> Result<Self, PoolError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&options.workers) {
            return Err(PoolError::InvalidWorkers {
                value: options.workers,
            });
        }
        Ok(Self {
            resolver,
            semaphore: Arc::new(Semaphore::new(options.workers)),
            options,
            stats: Arc::new(PoolStats::new()),
        })
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.options.workers
    }

    /// Shared live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// The resolver driven by this pool.
    #[must_use]
    pub fn resolver(&self) -> &Arc<MatchResolver> {
        &self.resolver
    }

    /// Resolves every entry. Output order follows completion, not input.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SemaphoreClosed`] if the worker semaphore closes.
    /// Individual entry failures never fail the run.
    pub async fn resolve_all(&self, entries: Vec<RawEntry>) -> Result<PoolOutcome, PoolError> {
        self.resolve_all_interruptible(entries, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Resolves every entry, stopping early when `interrupted` becomes `true`.
    ///
    /// On cancellation the pool:
    /// - stops dispatching new entries
    /// - lets in-flight lookups run for up to the drain timeout
    /// - aborts what is left and reports those entries as pending
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SemaphoreClosed`] if the worker semaphore closes.
    #[instrument(skip(self, entries, interrupted), fields(total = entries.len(), workers = self.options.workers))]
    pub async fn resolve_all_interruptible(
        &self,
        entries: Vec<RawEntry>,
        interrupted: Arc<AtomicBool>,
    ) -> Result<PoolOutcome, PoolError> {
        let total = entries.len();
        let inflight = InFlight::new();
        let mut handles: Vec<(RawEntry, JoinHandle<ResolutionRecord>)> = Vec::new();
        let mut records = Vec::with_capacity(total);
        let mut pending = Vec::new();

        info!("starting resolution run");

        let mut queue = entries.into_iter();
        for entry in queue.by_ref() {
            if interrupted.load(Ordering::SeqCst) {
                pending.push(entry);
                break;
            }
            collect_finished(&mut handles, &mut records, &self.stats).await;

            let claim = inflight.claim(&CacheKey::for_entry(&entry));
            let permit = if claim.is_leader() {
                // Race the permit against the flag so Ctrl-C during a full pool
                // stops dispatch immediately.
                let permit = tokio::select! {
                    biased;
                    () = wait_for_interrupt(&interrupted) => None,
                    result = Arc::clone(&self.semaphore).acquire_owned() => {
                        Some(result.map_err(|_| PoolError::SemaphoreClosed)?)
                    }
                };
                let Some(permit) = permit else {
                    pending.push(entry);
                    break;
                };
                Some(permit)
            } else {
                None
            };

            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&self.semaphore);
            let stats = Arc::clone(&self.stats);
            let task_entry = entry.clone();
            handles.push((
                entry,
                tokio::spawn(async move {
                    let _permit = permit;
                    resolve_one(&resolver, &semaphore, &stats, claim, task_entry).await
                }),
            ));
        }
        pending.extend(queue);

        debug!(in_flight = handles.len(), "waiting for lookups to finish");

        if interrupted.load(Ordering::SeqCst) {
            let deadline = tokio::time::Instant::now() + self.options.drain_timeout;
            for (entry, mut handle) in handles {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    handle.abort();
                    pending.push(entry);
                    continue;
                }
                match tokio::time::timeout(deadline - now, &mut handle).await {
                    Ok(Ok(record)) => records.push(record),
                    Ok(Err(error)) => records.push(failed_task_record(entry, &error, &self.stats)),
                    Err(_) => {
                        handle.abort();
                        pending.push(entry);
                    }
                }
            }
        } else {
            for (entry, handle) in handles {
                match handle.await {
                    Ok(record) => records.push(record),
                    Err(error) => records.push(failed_task_record(entry, &error, &self.stats)),
                }
            }
        }

        let was_interrupted = interrupted.load(Ordering::SeqCst);
        if was_interrupted {
            warn!(
                completed = records.len(),
                pending = pending.len(),
                "resolution run interrupted"
            );
        } else {
            info!(
                completed = records.len(),
                resolved = self.stats.resolved(),
                cache_hits = self.stats.cache_hits(),
                ambiguous = self.stats.ambiguous(),
                no_match = self.stats.no_match(),
                provider_error = self.stats.provider_error(),
                coalesced = self.stats.coalesced(),
                "resolution run complete"
            );
        }

        Ok(PoolOutcome {
            records,
            pending,
            interrupted: was_interrupted,
        })
    }
}

async fn resolve_one(
    resolver: &MatchResolver,
    semaphore: &Semaphore,
    stats: &PoolStats,
    claim: Claim,
    entry: RawEntry,
) -> ResolutionRecord {
    let key = CacheKey::for_entry(&entry);
    let verdict = match claim {
        Claim::Leader(leader) => {
            let verdict = resolver.lookup(&key, &entry).await;
            coalesce::publish(&leader, &verdict);
            verdict
        }
        Claim::Follower(leader) => {
            if let Some(verdict) = coalesce::follow(leader).await {
                debug!(key = %key, "coalesced with in-flight lookup");
                stats.increment_coalesced();
                verdict
            } else {
                debug!(key = %key, "in-flight lookup abandoned, taking over");
                let _permit = semaphore.acquire().await;
                resolver.lookup(&key, &entry).await
            }
        }
    };
    let record = verdict.into_record(entry);
    stats.record(&record);
    record
}

async fn wait_for_interrupt(interrupted: &AtomicBool) {
    while !interrupted.load(Ordering::SeqCst) {
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}

fn failed_task_record(entry: RawEntry, error: &JoinError, stats: &PoolStats) -> ResolutionRecord {
    warn!(title = %entry.title, error = %error, "resolution task failed");
    let record = Verdict {
        detail: Some(format!("resolution task failed: {error}")),
        ..Verdict::new(ResolutionStatus::Unresolved(UnresolvedReason::ProviderError))
    }
    .into_record(entry);
    stats.record(&record);
    record
}

async fn collect_finished(
    handles: &mut Vec<(RawEntry, JoinHandle<ResolutionRecord>)>,
    records: &mut Vec<ResolutionRecord>,
    stats: &PoolStats,
) {
    let mut idx = 0;
    while idx < handles.len() {
        if handles[idx].1.is_finished() {
            let (entry, handle) = handles.swap_remove(idx);
            match handle.await {
                Ok(record) => records.push(record),
                Err(error) => records.push(failed_task_record(entry, &error, stats)),
            }
        } else {
            idx += 1;
        }
    }
}
