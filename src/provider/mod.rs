//! External metadata provider boundary.
//!
//! The core treats the provider as an unreliable remote dependency: calls may be
//! slow, rate limited or fail outright. Everything the resolver needs from it is the
//! [`MetadataProvider`] trait; [`TmdbProvider`] is the production implementation.
//!
//! # Architecture
//!
//! - [`MetadataProvider`] - async trait, one `search` is one logical remote call
//! - [`TmdbProvider`] - TMDB v3 search client
//! - [`RateLimiter`] - global per-host requests-per-second ceiling
//! - [`ProviderError`] - transport and protocol failures

mod error;
mod http_client;
pub mod rate_limiter;
mod tmdb;

pub use error::ProviderError;
pub use http_client::{HttpTimeouts, build_provider_http_client, standard_user_agent};
pub use rate_limiter::RateLimiter;
pub use tmdb::TmdbProvider;

use async_trait::async_trait;

use crate::model::{MediaType, RawEntry};

/// A title query as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Title text to search for.
    pub title: String,
    /// Release year hint. Providers may use it to narrow results.
    pub year: Option<i32>,
    /// Restricts the search to one media type.
    pub media_type: Option<MediaType>,
}

impl SearchQuery {
    /// Builds the query for a raw entry.
    #[must_use]
    pub fn for_entry(entry: &RawEntry) -> Self {
        Self {
            title: entry.title.trim().to_string(),
            year: entry.year_hint,
            media_type: entry.type_hint,
        }
    }
}

/// An unscored search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCandidate {
    /// Provider identifier.
    pub id: u64,
    /// Movie or show.
    pub media_type: MediaType,
    /// Localized title.
    pub title: String,
    /// Title in the original language, when it differs.
    pub original_title: Option<String>,
    /// First release / air year.
    pub year: Option<i32>,
}

/// Source of candidate matches for a title.
///
/// # Object Safety
///
/// Uses `async_trait` so the resolver can hold an `Arc<dyn MetadataProvider>`.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Returns every candidate for `query`. An empty vector means "no match", not
    /// an error.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProviderCandidate>, ProviderError>;
}
