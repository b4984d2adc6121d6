//! Core data types flowing through the resolution pipeline.
//!
//! Scraping adapters produce [`RawEntry`] values, the
//! [`MatchResolver`](crate::MatchResolver) turns each into a [`ResolutionRecord`],
//! and the [`Reconciler`](crate::Reconciler) merges records by [`CanonicalEntity`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::title::{normalize_whitespace_lower, split_trailing_year};

/// Kind of title in the metadata provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Feature film (`/search/movie` on TMDB).
    Movie,
    /// Television series (`/search/tv` on TMDB).
    Show,
}

impl MediaType {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "film" => Ok(Self::Movie),
            "show" | "tv" | "series" => Ok(Self::Show),
            _ => Err(format!("invalid media type: {s}")),
        }
    }
}

/// A title as extracted by a scraping adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Title text as scraped.
    pub title: String,
    /// Best-effort release year.
    pub year_hint: Option<i32>,
    /// Best-effort media type.
    pub type_hint: Option<MediaType>,
    /// Which list or file the entry came from.
    pub source_id: String,
}

impl RawEntry {
    /// Creates an entry with no hints.
    #[must_use]
    pub fn new(title: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year_hint: None,
            type_hint: None,
            source_id: source_id.into(),
        }
    }

    /// Sets the year hint.
    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year_hint = Some(year);
        self
    }

    /// Sets the media type hint.
    #[must_use]
    pub fn with_type(mut self, media_type: MediaType) -> Self {
        self.type_hint = Some(media_type);
        self
    }

    /// Builds an entry from a free-form list line such as `Inception (2010)`.
    ///
    /// Returns `None` for blank lines.
    #[must_use]
    pub fn from_line(line: &str, source_id: impl Into<String>) -> Option<Self> {
        let (title, year_hint) = split_trailing_year(line);
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title,
            year_hint,
            type_hint: None,
            source_id: source_id.into(),
        })
    }
}

/// Normalized lookup signature for a [`RawEntry`].
///
/// Two entries with equal keys are the same question to the provider; the pool
/// never runs two lookups for one key concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key from title, year hint and type hint.
    ///
    /// # Examples
    ///
    /// ```
    /// use titlesync_core::{CacheKey, MediaType, RawEntry};
    ///
    /// let entry = RawEntry::new("  The   Office ", "list-a").with_type(MediaType::Show);
    /// assert_eq!(CacheKey::for_entry(&entry).as_str(), "the office|-|show");
    /// ```
    #[must_use]
    pub fn for_entry(entry: &RawEntry) -> Self {
        let year = entry
            .year_hint
            .map_or_else(|| "-".to_string(), |y| y.to_string());
        let media = entry.type_hint.map_or("-", |t| t.as_str());
        Self(format!(
            "{}|{year}|{media}",
            normalize_whitespace_lower(&entry.title)
        ))
    }

    /// Wraps a key string loaded from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scored provider candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    /// TMDB identifier.
    pub tmdb_id: u64,
    /// Movie or show.
    pub media_type: MediaType,
    /// Title as known by the provider.
    pub canonical_title: String,
    /// First release / air year.
    pub release_year: Option<i32>,
    /// Match score in `0.0..=1.0`.
    pub score: f64,
}

impl CandidateMatch {
    /// Identity of the candidate.
    #[must_use]
    pub fn entity(&self) -> CanonicalEntity {
        CanonicalEntity {
            tmdb_id: self.tmdb_id,
            media_type: self.media_type,
        }
    }
}

/// Why an entry ended up unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The provider answered but nothing scored above the minimum.
    NoMatch,
    /// The provider could not be reached or kept failing.
    ProviderError,
}

/// Outcome of resolving one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum ResolutionStatus {
    /// One candidate won with high confidence.
    Resolved,
    /// Several plausible candidates, or the best one is not convincing.
    Ambiguous,
    /// No usable answer.
    Unresolved(UnresolvedReason),
    /// Answered from the lookup cache.
    CacheHit,
}

impl ResolutionStatus {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Ambiguous => "ambiguous",
            Self::Unresolved(UnresolvedReason::NoMatch) => "no_match",
            Self::Unresolved(UnresolvedReason::ProviderError) => "provider_error",
            Self::CacheHit => "cache_hit",
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error report grouping for entries that need manual attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// No suitable candidate (negatively cached).
    NoMatch,
    /// Several candidates; a human has to pick.
    Ambiguous,
    /// Transport-level failure; retried on the next run.
    ProviderError,
}

impl ErrorReason {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatch => "no_match",
            Self::Ambiguous => "ambiguous",
            Self::ProviderError => "provider_error",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `(tmdb_id, media_type)` identity of a title across all sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalEntity {
    /// TMDB identifier.
    pub tmdb_id: u64,
    /// Movie or show. TMDB ids are only unique per media type.
    pub media_type: MediaType,
}

impl fmt::Display for CanonicalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.media_type, self.tmdb_id)
    }
}

/// Result of resolving one [`RawEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// The entry this record answers.
    pub raw_entry: RawEntry,
    /// Outcome.
    pub status: ResolutionStatus,
    /// Winning candidate for resolved (and cached resolved) records.
    pub chosen: Option<CandidateMatch>,
    /// Score of the best candidate, `0.0` when there was none.
    pub confidence: f64,
    /// Surviving candidates, kept for ambiguous records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateMatch>,
    /// Human-readable failure detail for provider errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the verdict was produced.
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionRecord {
    /// Identity of the chosen candidate when the record counts as resolved.
    #[must_use]
    pub fn canonical(&self) -> Option<CanonicalEntity> {
        match self.status {
            ResolutionStatus::Resolved | ResolutionStatus::CacheHit => {
                self.chosen.as_ref().map(CandidateMatch::entity)
            }
            ResolutionStatus::Ambiguous | ResolutionStatus::Unresolved(_) => None,
        }
    }

    /// Error grouping for records that do not make it into the final list.
    ///
    /// A cache hit without a chosen candidate is a cached negative result.
    #[must_use]
    pub fn error_reason(&self) -> Option<ErrorReason> {
        match self.status {
            ResolutionStatus::Ambiguous => Some(ErrorReason::Ambiguous),
            ResolutionStatus::Unresolved(UnresolvedReason::NoMatch) => Some(ErrorReason::NoMatch),
            ResolutionStatus::Unresolved(UnresolvedReason::ProviderError) => {
                Some(ErrorReason::ProviderError)
            }
            ResolutionStatus::Resolved => None,
            ResolutionStatus::CacheHit => self.chosen.is_none().then_some(ErrorReason::NoMatch),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(status: ResolutionStatus, chosen: Option<CandidateMatch>) -> ResolutionRecord {
        ResolutionRecord {
            raw_entry: RawEntry::new("Heat", "test"),
            status,
            chosen,
            confidence: 0.9,
            candidates: Vec::new(),
            detail: None,
            resolved_at: Utc::now(),
        }
    }

    fn heat() -> CandidateMatch {
        CandidateMatch {
            tmdb_id: 949,
            media_type: MediaType::Movie,
            canonical_title: "Heat".to_string(),
            release_year: Some(1995),
            score: 1.0,
        }
    }

    #[test]
    fn test_cache_key_includes_hints() {
        let plain = RawEntry::new("Heat", "a");
        let hinted = RawEntry::new("Heat", "a")
            .with_year(1995)
            .with_type(MediaType::Movie);
        assert_eq!(CacheKey::for_entry(&plain).as_str(), "heat|-|-");
        assert_eq!(CacheKey::for_entry(&hinted).as_str(), "heat|1995|movie");
    }

    #[test]
    fn test_cache_key_ignores_source_and_spacing() {
        let a = RawEntry::new("The  Office", "list-a");
        let b = RawEntry::new("the office ", "list-b");
        assert_eq!(CacheKey::for_entry(&a), CacheKey::for_entry(&b));
    }

    #[test]
    fn test_raw_entry_from_line_parses_year() {
        let entry = RawEntry::from_line("Inception (2010)", "file").unwrap();
        assert_eq!(entry.title, "Inception");
        assert_eq!(entry.year_hint, Some(2010));
        assert_eq!(entry.source_id, "file");
        assert!(RawEntry::from_line("   ", "file").is_none());
    }

    #[test]
    fn test_media_type_from_str_aliases() {
        assert_eq!("tv".parse::<MediaType>().unwrap(), MediaType::Show);
        assert_eq!("Movie".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert!("book".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_canonical_only_for_resolved_states() {
        assert!(record(ResolutionStatus::Resolved, Some(heat())).canonical().is_some());
        assert!(record(ResolutionStatus::CacheHit, Some(heat())).canonical().is_some());
        assert!(record(ResolutionStatus::Ambiguous, Some(heat())).canonical().is_none());
        assert!(record(ResolutionStatus::CacheHit, None).canonical().is_none());
    }

    #[test]
    fn test_error_reason_for_cached_negative() {
        assert_eq!(
            record(ResolutionStatus::CacheHit, None).error_reason(),
            Some(ErrorReason::NoMatch)
        );
        assert_eq!(record(ResolutionStatus::CacheHit, Some(heat())).error_reason(), None);
        assert_eq!(
            record(
                ResolutionStatus::Unresolved(UnresolvedReason::ProviderError),
                None
            )
            .error_reason(),
            Some(ErrorReason::ProviderError)
        );
    }

    #[test]
    fn test_status_serde_shape() {
        let json = serde_json::to_value(ResolutionStatus::Unresolved(UnresolvedReason::NoMatch))
            .unwrap();
        assert_eq!(json, serde_json::json!({"status": "unresolved", "reason": "no_match"}));
        let back: ResolutionStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, ResolutionStatus::Unresolved(UnresolvedReason::NoMatch));
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(heat().entity().to_string(), "movie:949");
    }
}
