//! TMDB provider - looks titles up through the TMDB v3 search API.
//!
//! Shows are searched through `/search/tv`, films through `/search/movie`. Without
//! a type hint both endpoints are queried (TV first) and the results concatenated.
//! A year hint is sent as `year` (movies) or `first_air_date_year` (shows); when the
//! narrowed search finds nothing the title is searched again without it.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::MediaType;
use crate::title::fallback_query;

use super::http_client::{HttpTimeouts, build_provider_http_client};
use super::rate_limiter::parse_retry_after;
use super::{MetadataProvider, ProviderCandidate, ProviderError, RateLimiter, SearchQuery};

/// Default TMDB API base URL.
const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Results kept per endpoint; TMDB pages hold 20 and relevance drops fast.
const MAX_RESULTS_PER_KIND: usize = 10;

// ==================== TMDB API Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct TmdbSearchResponse {
    #[serde(default)]
    pub results: Vec<TmdbResult>,
}

/// One search hit. Movies use `title`/`release_date`, shows `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
pub(crate) struct TmdbResult {
    pub id: u64,
    pub title: Option<String>,
    pub name: Option<String>,
    pub original_title: Option<String>,
    pub original_name: Option<String>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
}

impl TmdbResult {
    fn into_candidate(self, kind: MediaType) -> Option<ProviderCandidate> {
        let (title, original, date) = match kind {
            MediaType::Movie => (self.title, self.original_title, self.release_date),
            MediaType::Show => (self.name, self.original_name, self.first_air_date),
        };
        let title = title.filter(|t| !t.trim().is_empty())?;
        let original_title = original.filter(|o| !o.trim().is_empty() && *o != title);
        Some(ProviderCandidate {
            id: self.id,
            media_type: kind,
            title,
            original_title,
            year: date.as_deref().and_then(year_of),
        })
    }
}

/// Year prefix of a `YYYY-MM-DD` date; TMDB sends `""` for unknown dates.
fn year_of(date: &str) -> Option<i32> {
    date.get(..4).and_then(|y| y.parse().ok())
}

fn endpoint_for(kind: MediaType) -> &'static str {
    match kind {
        MediaType::Movie => "/search/movie",
        MediaType::Show => "/search/tv",
    }
}

fn year_param_for(kind: MediaType) -> &'static str {
    match kind {
        MediaType::Movie => "year",
        MediaType::Show => "first_air_date_year",
    }
}

// ==================== TmdbProvider ====================

/// TMDB v3 search client.
///
/// Every HTTP request first takes a slot from the shared [`RateLimiter`]. A 429
/// response hands its Retry-After delay back to the limiter before the error is
/// returned, so the whole pool slows down, not just the failing worker.
pub struct TmdbProvider {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

impl TmdbProvider {
    /// Creates a provider against the public TMDB API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ClientBuild`] if HTTP client construction fails.
    pub fn new(
        api_key: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, limiter)
    }

    /// Creates a provider with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ClientBuild`] if HTTP client construction fails.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ProviderError> {
        let client = build_provider_http_client("tmdb", HttpTimeouts::default())?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            limiter,
        })
    }

    /// Searches `title`, narrowed by `year` first and unnarrowed if that is empty.
    async fn search_title(
        &self,
        title: &str,
        kinds: &[MediaType],
        year: Option<i32>,
    ) -> Result<Vec<ProviderCandidate>, ProviderError> {
        let candidates = self.search_kinds(title, kinds, year).await?;
        if !candidates.is_empty() || year.is_none() {
            return Ok(candidates);
        }
        debug!(year, "no results for year hint, searching without it");
        self.search_kinds(title, kinds, None).await
    }

    async fn search_kinds(
        &self,
        title: &str,
        kinds: &[MediaType],
        year: Option<i32>,
    ) -> Result<Vec<ProviderCandidate>, ProviderError> {
        let mut candidates = Vec::new();
        for &kind in kinds {
            candidates.extend(self.search_kind(title, kind, year).await?);
        }
        Ok(candidates)
    }

    async fn search_kind(
        &self,
        title: &str,
        kind: MediaType,
        year: Option<i32>,
    ) -> Result<Vec<ProviderCandidate>, ProviderError> {
        let endpoint = endpoint_for(kind);
        let mut url = format!(
            "{}{endpoint}?api_key={}&query={}&language=en-US",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(title),
        );
        if let Some(year) = year {
            url.push_str(&format!("&{}={year}", year_param_for(kind)));
        }

        self.limiter.acquire(&url).await;
        debug!(endpoint, query = %title, ?year, "calling TMDB");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if status.as_u16() == 429 {
                if let Some(delay) = retry_after.as_deref().and_then(parse_retry_after) {
                    self.limiter.record_rate_limit(&url, delay).await;
                }
                warn!(endpoint, retry_after = ?retry_after, "TMDB rate limit hit");
            } else {
                debug!(endpoint, status = status.as_u16(), "TMDB error status");
            }
            return Err(ProviderError::http_status_with_retry_after(
                endpoint,
                status.as_u16(),
                retry_after,
            ));
        }

        let body = response
            .json::<TmdbSearchResponse>()
            .await
            .map_err(|e| ProviderError::decode(endpoint, e.without_url()))?;

        let candidates: Vec<_> = body
            .results
            .into_iter()
            .filter_map(|r| r.into_candidate(kind))
            .take(MAX_RESULTS_PER_KIND)
            .collect();
        debug!(endpoint, count = candidates.len(), "TMDB results");
        Ok(candidates)
    }
}

impl std::fmt::Debug for TmdbProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmdbProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    #[tracing::instrument(skip(self), fields(provider = "tmdb", title = %query.title))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProviderCandidate>, ProviderError> {
        let kinds: &[MediaType] = match query.media_type {
            Some(MediaType::Show) => &[MediaType::Show],
            Some(MediaType::Movie) => &[MediaType::Movie],
            None => &[MediaType::Show, MediaType::Movie],
        };

        let candidates = self.search_title(&query.title, kinds, query.year).await?;
        if !candidates.is_empty() {
            return Ok(candidates);
        }

        match fallback_query(&query.title) {
            Some(fallback) => {
                debug!(fallback = %fallback, "no results, retrying with cleaned title");
                self.search_title(&fallback, kinds, query.year).await
            }
            None => Ok(candidates),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TmdbSearchResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_movie_result_uses_title_and_release_date() {
        let body = parse(
            r#"{"page":1,"results":[{"id":27205,"title":"Inception","original_title":"Inception","release_date":"2010-07-15"}]}"#,
        );
        let candidate = body
            .results
            .into_iter()
            .next()
            .unwrap()
            .into_candidate(MediaType::Movie)
            .unwrap();
        assert_eq!(candidate.id, 27205);
        assert_eq!(candidate.title, "Inception");
        assert_eq!(candidate.original_title, None, "identical original title is dropped");
        assert_eq!(candidate.year, Some(2010));
    }

    #[test]
    fn test_show_result_uses_name_and_first_air_date() {
        let body = parse(
            r#"{"results":[{"id":1396,"name":"Breaking Bad","original_name":"Breaking Bad","first_air_date":"2008-01-20"}]}"#,
        );
        let candidate = body
            .results
            .into_iter()
            .next()
            .unwrap()
            .into_candidate(MediaType::Show)
            .unwrap();
        assert_eq!(candidate.media_type, MediaType::Show);
        assert_eq!(candidate.title, "Breaking Bad");
        assert_eq!(candidate.year, Some(2008));
    }

    #[test]
    fn test_empty_date_means_no_year() {
        let body = parse(r#"{"results":[{"id":1,"title":"Untitled","release_date":""}]}"#);
        let candidate = body
            .results
            .into_iter()
            .next()
            .unwrap()
            .into_candidate(MediaType::Movie)
            .unwrap();
        assert_eq!(candidate.year, None);
    }

    #[test]
    fn test_result_without_title_is_skipped() {
        let body = parse(r#"{"results":[{"id":5,"name":"A show"}]}"#);
        let result = body.results.into_iter().next().unwrap();
        assert!(result.into_candidate(MediaType::Movie).is_none());
    }

    #[test]
    fn test_original_title_kept_when_different() {
        let body = parse(
            r#"{"results":[{"id":129,"title":"Spirited Away","original_title":"千と千尋の神隠し","release_date":"2001-07-20"}]}"#,
        );
        let candidate = body
            .results
            .into_iter()
            .next()
            .unwrap()
            .into_candidate(MediaType::Movie)
            .unwrap();
        assert_eq!(candidate.original_title.as_deref(), Some("千と千尋の神隠し"));
    }

    #[test]
    fn test_missing_results_field_is_empty() {
        assert!(parse("{}").results.is_empty());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider =
            TmdbProvider::new("secret-key", Arc::new(RateLimiter::disabled())).unwrap();
        let debug = format!("{provider:?}");
        assert!(!debug.contains("secret-key"));
    }
}
