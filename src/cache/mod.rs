//! Persistent lookup cache keyed by [`CacheKey`].
//!
//! The cache is process-wide state with an explicit lifecycle:
//! [`LookupCache::load`] reads every stored verdict at startup, lookups and writes
//! go through the mutex-protected in-memory map, and [`LookupCache::flush`] writes a
//! full snapshot back at the end of a run.
//!
//! # What gets cached
//!
//! | Verdict | Cached | Why it matters |
//! |---------|--------|----------------|
//! | Resolved | yes | never asked again |
//! | Unresolved / no match | yes, optionally with a TTL | known-bad titles are not re-queried |
//! | Ambiguous | no | resurfaced every run until fixed |
//! | Unresolved / provider error | no | transport failures retry next run |
//!
//! # Example
//!
//! ```no_run
//! use titlesync_core::{CachePolicy, Database, LookupCache};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("cache.db")).await?;
//! let cache = LookupCache::load(db, CachePolicy::default()).await?;
//! // ... resolve titles ...
//! cache.flush().await?;
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::CacheError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::db::Database;
use crate::model::{CacheKey, ResolutionRecord, ResolutionStatus, UnresolvedReason};

const OUTCOME_RESOLVED: &str = "resolved";
const OUTCOME_NO_MATCH: &str = "no_match";

/// Retention rules applied when writing entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    /// How long negative (no-match) entries stay valid. `None` keeps them until purged.
    pub negative_ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: ResolutionRecord,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn is_negative(&self) -> bool {
        self.record.chosen.is_none()
    }

    fn outcome(&self) -> &'static str {
        if self.is_negative() {
            OUTCOME_NO_MATCH
        } else {
            OUTCOME_RESOLVED
        }
    }
}

/// Counters describing cache traffic during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Lookups that fell through to the provider.
    pub misses: usize,
    /// Records written.
    pub writes: usize,
}

/// Shared key -> verdict store.
///
/// Designed to be wrapped in `Arc` and shared across worker tasks. Every read and
/// write goes through one `tokio::sync::Mutex`; nothing else touches the map.
#[derive(Debug)]
pub struct LookupCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    /// Serializes flushes so two snapshots never interleave.
    flush_lock: Mutex<()>,
    store: Option<Database>,
    policy: CachePolicy,
    hits: AtomicUsize,
    misses: AtomicUsize,
    writes: AtomicUsize,
}

impl LookupCache {
    /// Creates a cache with no backing store. [`flush`](Self::flush) is a no-op.
    #[must_use]
    pub fn ephemeral(policy: CachePolicy) -> Self {
        Self::with_entries(HashMap::new(), None, policy)
    }

    /// Loads every stored, unexpired entry from `db`.
    ///
    /// Rows whose snapshot cannot be decoded are skipped with a warning; they are
    /// dropped from the store at the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the table cannot be read.
    #[instrument(skip_all)]
    pub async fn load(db: Database, policy: CachePolicy) -> Result<Self, CacheError> {
        let rows = sqlx::query("SELECT cache_key, record, expires_at FROM lookup_cache")
            .fetch_all(db.pool())
            .await?;

        let now = Utc::now();
        let mut entries = HashMap::with_capacity(rows.len());
        let mut skipped = 0usize;

        for row in rows {
            let key: String = row.get("cache_key");
            let raw_record: String = row.get("record");
            let expires_raw: Option<String> = row.get("expires_at");

            let record = match serde_json::from_str::<ResolutionRecord>(&raw_record) {
                Ok(record) => record,
                Err(error) => {
                    warn!(key = %key, error = %error, "skipping undecodable cache row");
                    skipped += 1;
                    continue;
                }
            };
            let expires_at = expires_raw
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|at| at.with_timezone(&Utc));

            let entry = CacheEntry { record, expires_at };
            if entry.is_expired(now) {
                skipped += 1;
                continue;
            }
            entries.insert(CacheKey::from_raw(key), entry);
        }

        info!(loaded = entries.len(), skipped, "lookup cache loaded");
        Ok(Self::with_entries(entries, Some(db), policy))
    }

    fn with_entries(
        entries: HashMap<CacheKey, CacheEntry>,
        store: Option<Database>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            entries: Mutex::new(entries),
            flush_lock: Mutex::new(()),
            store,
            policy,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Returns the cached snapshot for `key`, or `None` on a miss.
    ///
    /// Expired entries count as a miss and are evicted.
    pub async fn get(&self, key: &CacheKey) -> Option<ResolutionRecord> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();

        let found = match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                debug!(key = %key, "cache entry expired");
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.record.clone()),
            None => None,
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        } else {
            self.misses.fetch_add(1, Ordering::SeqCst);
        }
        found
    }

    /// Stores `record` under `key`, replacing any previous entry wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotCacheable`] for ambiguous records, provider errors and
    /// cache hits; those must be re-resolved on the next run.
    pub async fn put(&self, key: CacheKey, record: ResolutionRecord) -> Result<(), CacheError> {
        let expires_at = match record.status {
            ResolutionStatus::Resolved => None,
            ResolutionStatus::Unresolved(UnresolvedReason::NoMatch) => self
                .policy
                .negative_ttl
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
                .map(|ttl| record.resolved_at + ttl),
            status @ (ResolutionStatus::Ambiguous
            | ResolutionStatus::Unresolved(UnresolvedReason::ProviderError)
            | ResolutionStatus::CacheHit) => {
                return Err(CacheError::NotCacheable {
                    key: key.to_string(),
                    status,
                });
            }
        };

        debug!(key = %key, status = %record.status, "caching verdict");
        self.entries
            .lock()
            .await
            .insert(key, CacheEntry { record, expires_at });
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Removes every negative entry so those titles are re-resolved.
    ///
    /// Returns the number of entries removed. Call [`flush`](Self::flush) to persist.
    #[instrument(skip(self))]
    pub async fn purge_unresolved(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_negative());
        let purged = before - entries.len();
        info!(purged, "purged negative cache entries");
        purged
    }

    /// Removes the entry for `key` if it is negative. Resolved entries stay.
    ///
    /// Returns `true` when an entry was removed.
    pub async fn forget_unresolved(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(CacheEntry::is_negative) {
            entries.remove(key);
            debug!(key = %key, "forgot negative cache entry");
            true
        } else {
            false
        }
    }

    /// Writes a full snapshot of the cache to the backing store.
    ///
    /// Safe to call any number of times; each call replaces the stored table
    /// with the current contents. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialize`] or [`CacheError::Store`] on failure. The
    /// transaction is rolled back, leaving the previous snapshot intact.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<usize, CacheError> {
        let Some(db) = &self.store else {
            debug!("ephemeral cache, nothing to flush");
            return Ok(0);
        };

        let _flush_guard = self.flush_lock.lock().await;
        let now = Utc::now();
        let snapshot: Vec<(CacheKey, CacheEntry)> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter(|(_, entry)| !entry.is_expired(now))
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect()
        };

        let mut tx = db.pool().begin().await?;
        sqlx::query("DELETE FROM lookup_cache")
            .execute(&mut *tx)
            .await?;

        for (key, entry) in &snapshot {
            let payload =
                serde_json::to_string(&entry.record).map_err(|source| CacheError::Serialize {
                    key: key.to_string(),
                    source,
                })?;
            sqlx::query(
                r"INSERT INTO lookup_cache (cache_key, outcome, record, resolved_at, expires_at)
                  VALUES (?, ?, ?, ?, ?)",
            )
            .bind(key.as_str())
            .bind(entry.outcome())
            .bind(payload)
            .bind(entry.record.resolved_at.to_rfc3339())
            .bind(entry.expires_at.map(|at| at.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(rows = snapshot.len(), "lookup cache flushed");
        Ok(snapshot.len())
    }

    /// Number of entries currently held (including not yet evicted expired ones).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` when the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Traffic counters since the cache was created.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }
}
