//! Titlesync Core Library
//!
//! Resolves movie and TV titles scraped from list sites against TMDB and merges
//! them into one duplicate-free list keyed by `(tmdb_id, media_type)`.
//!
//! # Architecture
//!
//! Raw entries flow through the pipeline in this order:
//! - [`pool`] - bounded, cancellable fan-out that coalesces duplicate lookups
//! - [`resolver`] - cache check, provider search with retries, scoring and decision
//! - [`cache`] - persistent lookup cache (resolved and no-match verdicts)
//! - [`provider`] - the TMDB client and its global rate limiter
//! - [`reconcile`] - identity-based merge into a final list and an error report
//!
//! Supporting modules: [`model`] (shared types), [`title`] (normalization),
//! [`listfile`] (on-disk list format), [`config`] and [`db`].

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod db;
pub mod listfile;
pub mod model;
pub mod pool;
pub mod provider;
pub mod reconcile;
pub mod resolver;
pub mod title;

// Re-export commonly used types
pub use cache::{CacheError, CachePolicy, CacheStats, LookupCache};
pub use config::{ConfigError, ResolverConfig};
pub use db::{Database, DbError};
pub use listfile::{ListFileError, ListLine, ParsedList};
pub use model::{
    CacheKey, CandidateMatch, CanonicalEntity, ErrorReason, MediaType, RawEntry,
    ResolutionRecord, ResolutionStatus, UnresolvedReason,
};
pub use pool::{PoolError, PoolOptions, PoolOutcome, PoolStats, ResolutionPool};
pub use provider::{MetadataProvider, ProviderError, RateLimiter, TmdbProvider};
pub use reconcile::{ErrorEntry, ErrorReport, ListEntry, Reconciler, Reconciliation};
pub use resolver::{MatchResolver, MatchThresholds, RetryPolicy, Verdict};
