//! Match resolution: one raw entry in, one verdict out.
//!
//! The [`MatchResolver`] checks the [`LookupCache`], queries the
//! [`MetadataProvider`] with retry and backoff, scores the candidates and applies the
//! decision policy. Resolved and no-match verdicts are written back to the cache;
//! ambiguous verdicts and provider failures never are.
//!
//! # Architecture
//!
//! - [`MatchResolver`] - cache check, provider call with retries, decision, cache write
//! - [`Verdict`] - the entry-independent outcome for one [`CacheKey`]
//! - [`MatchThresholds`], [`score_candidate`], [`decide`] - scoring policy
//! - [`RetryPolicy`], [`classify_error`] - backoff for transient provider failures
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use titlesync_core::provider::{RateLimiter, TmdbProvider};
//! use titlesync_core::{CachePolicy, LookupCache, MatchResolver, RawEntry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::per_second(4.0));
//! let provider = Arc::new(TmdbProvider::new("api-key", limiter)?);
//! let cache = Arc::new(LookupCache::ephemeral(CachePolicy::default()));
//! let resolver = MatchResolver::new(cache, provider);
//!
//! let record = resolver.resolve(RawEntry::new("Inception", "watchlist").with_year(2010)).await;
//! println!("{}: {:?}", record.status, record.chosen);
//! # Ok(())
//! # }
//! ```

mod retry;
mod scoring;

pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    retry_after_hint,
};
pub use scoring::{MatchThresholds, decide, score_candidate};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::cache::LookupCache;
use crate::model::{
    CacheKey, CandidateMatch, RawEntry, ResolutionRecord, ResolutionStatus, UnresolvedReason,
};
use crate::provider::{MetadataProvider, ProviderCandidate, ProviderError, SearchQuery};

/// Outcome of resolving one [`CacheKey`], independent of which entry asked.
///
/// Coalesced entries share one verdict and each turn it into its own record
/// with [`into_record`](Self::into_record).
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Resolution status.
    pub status: ResolutionStatus,
    /// Winning candidate, when resolved.
    pub chosen: Option<CandidateMatch>,
    /// Best candidate score, `0.0` when there is none.
    pub confidence: f64,
    /// Candidates that survived the minimum score, best first.
    pub candidates: Vec<CandidateMatch>,
    /// Failure description for provider errors.
    pub detail: Option<String>,
    /// When the verdict was reached.
    pub resolved_at: DateTime<Utc>,
}

impl Verdict {
    /// Empty verdict with the given status.
    #[must_use]
    pub fn new(status: ResolutionStatus) -> Self {
        Self {
            status,
            chosen: None,
            confidence: 0.0,
            candidates: Vec::new(),
            detail: None,
            resolved_at: Utc::now(),
        }
    }

    /// Verdict for a provider that kept failing.
    #[must_use]
    pub fn provider_error(error: &ProviderError) -> Self {
        Self {
            detail: Some(error.to_string()),
            ..Self::new(ResolutionStatus::Unresolved(UnresolvedReason::ProviderError))
        }
    }

    /// Verdict replayed from a cache snapshot.
    #[must_use]
    pub fn from_cache(snapshot: ResolutionRecord) -> Self {
        Self {
            status: ResolutionStatus::CacheHit,
            chosen: snapshot.chosen,
            confidence: snapshot.confidence,
            candidates: snapshot.candidates,
            detail: snapshot.detail,
            resolved_at: snapshot.resolved_at,
        }
    }

    /// Whether this verdict may be written to the lookup cache.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self.status,
            ResolutionStatus::Resolved | ResolutionStatus::Unresolved(UnresolvedReason::NoMatch)
        )
    }

    /// Attaches the verdict to the entry that asked for it.
    #[must_use]
    pub fn into_record(self, raw_entry: RawEntry) -> ResolutionRecord {
        ResolutionRecord {
            raw_entry,
            status: self.status,
            chosen: self.chosen,
            confidence: self.confidence,
            candidates: self.candidates,
            detail: self.detail,
            resolved_at: self.resolved_at,
        }
    }
}

/// Resolves raw entries against the cache and the metadata provider.
///
/// Share one resolver across the pool through `Arc`; all of its state is
/// either immutable or atomic.
pub struct MatchResolver {
    cache: Arc<LookupCache>,
    provider: Arc<dyn MetadataProvider>,
    retry_policy: RetryPolicy,
    thresholds: MatchThresholds,
    provider_calls: AtomicUsize,
    retries: AtomicUsize,
}

impl MatchResolver {
    /// Creates a resolver with the default retry policy and thresholds.
    #[must_use]
    pub fn new(cache: Arc<LookupCache>, provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            cache,
            provider,
            retry_policy: RetryPolicy::default(),
            thresholds: MatchThresholds::default(),
            provider_calls: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Replaces the decision thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: MatchThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// The cache this resolver reads and writes.
    #[must_use]
    pub fn cache(&self) -> &Arc<LookupCache> {
        &self.cache
    }

    /// Active decision thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &MatchThresholds {
        &self.thresholds
    }

    /// Number of provider `search` calls made, retries included.
    #[must_use]
    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::SeqCst)
    }

    /// Number of retries performed after failed provider calls.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Resolves one entry. Never fails: provider trouble becomes an
    /// `Unresolved(ProviderError)` record.
    pub async fn resolve(&self, entry: RawEntry) -> ResolutionRecord {
        let key = CacheKey::for_entry(&entry);
        self.lookup(&key, &entry).await.into_record(entry)
    }

    /// Produces the verdict for `key`, using `entry` for the query and scoring.
    ///
    /// A cache hit returns immediately with no provider call.
    #[instrument(skip(self, entry), fields(key = %key))]
    pub async fn lookup(&self, key: &CacheKey, entry: &RawEntry) -> Verdict {
        if let Some(snapshot) = self.cache.get(key).await {
            debug!("cache hit");
            return Verdict::from_cache(snapshot);
        }

        let query = SearchQuery::for_entry(entry);
        let verdict = match self.search_with_retry(&query).await {
            Ok(found) => {
                let scored: Vec<CandidateMatch> = found
                    .into_iter()
                    .filter_map(|candidate| score_candidate(entry, candidate))
                    .collect();
                decide(scored, &self.thresholds)
            }
            Err(error) => Verdict::provider_error(&error),
        };

        if verdict.is_cacheable()
            && let Err(error) = self
                .cache
                .put(key.clone(), verdict.clone().into_record(entry.clone()))
                .await
        {
            warn!(error = %error, "failed to cache verdict");
        }

        debug!(status = %verdict.status, confidence = verdict.confidence, "lookup finished");
        verdict
    }

    /// Runs a one-off provider search and returns every scored candidate, best
    /// first, without applying thresholds or touching the cache.
    ///
    /// # Errors
    ///
    /// Returns the last [`ProviderError`] once retries are exhausted.
    #[instrument(skip(self, entry), fields(title = %entry.title))]
    pub async fn candidates(&self, entry: &RawEntry) -> Result<Vec<CandidateMatch>, ProviderError> {
        let found = self
            .search_with_retry(&SearchQuery::for_entry(entry))
            .await?;
        let mut scored: Vec<CandidateMatch> = found
            .into_iter()
            .filter_map(|candidate| score_candidate(entry, candidate))
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }

    async fn search_with_retry(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<ProviderCandidate>, ProviderError> {
        let mut attempt = 1;
        loop {
            self.provider_calls.fetch_add(1, Ordering::SeqCst);
            let error = match self.provider.search(query).await {
                Ok(found) => return Ok(found),
                Err(error) => error,
            };

            match self
                .retry_policy
                .should_retry(classify_error(&error), attempt)
            {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    let delay = retry_after_hint(&error).unwrap_or(delay);
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "provider call failed, retrying"
                    );
                    self.retries.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        error = %error,
                        %reason,
                        "provider call failed"
                    );
                    return Err(error);
                }
            }
        }
    }
}

impl std::fmt::Debug for MatchResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchResolver")
            .field("provider", &self.provider.name())
            .field("retry_policy", &self.retry_policy)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}
