//! Resolver configuration values and validation.
//!
//! Where the values come from (config file, environment, CLI flags) is the
//! binary's business; this module only holds the merged values and checks them
//! before any remote call is made.

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CachePolicy;
use crate::pool::{DEFAULT_DRAIN_TIMEOUT, DEFAULT_WORKERS, MAX_WORKERS, MIN_WORKERS, PoolOptions};
use crate::resolver::{MatchThresholds, RetryPolicy};

/// Default requests per second against the provider.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 4.0;

/// Default retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Upper bound for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Upper bound for `requests_per_second`.
pub const MAX_REQUESTS_PER_SECOND: f64 = 50.0;

/// Default cache database file name.
pub const DEFAULT_CACHE_FILE: &str = "titlesync-cache.db";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Fatal configuration problems, reported before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Matching is enabled but no API key is configured.
    #[error("TMDB API key is missing: set TMDB_API_KEY or disable matching")]
    MissingApiKey,

    /// A value is outside its allowed range.
    #[error("invalid value for `{field}`: {value} (expected {expected})")]
    InvalidValue {
        /// Name of the offending setting.
        field: &'static str,
        /// The rejected value as given.
        value: String,
        /// What would have been accepted.
        expected: &'static str,
    },
}

impl ConfigError {
    /// Creates an [`InvalidValue`](Self::InvalidValue) error.
    #[must_use]
    pub fn invalid(field: &'static str, value: impl Display, expected: &'static str) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Everything the resolution pipeline needs to run.
#[derive(Clone, PartialEq)]
pub struct ResolverConfig {
    /// TMDB v3 API key.
    pub api_key: Option<String>,
    /// When false, titles are passed through without any lookup.
    pub matching_enabled: bool,
    /// Whether list lines carry `(Year)`.
    pub include_year: bool,
    /// Concurrent lookups.
    pub workers: usize,
    /// Global request ceiling; `0` disables rate limiting.
    pub requests_per_second: f64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Scoring thresholds.
    pub thresholds: MatchThresholds,
    /// Lookup cache database.
    pub cache_path: PathBuf,
    /// Days a no-match verdict stays cached; `None` keeps it until purged.
    pub negative_cache_days: Option<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            matching_enabled: true,
            include_year: true,
            workers: DEFAULT_WORKERS,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_retries: DEFAULT_MAX_RETRIES,
            thresholds: MatchThresholds::default(),
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            negative_cache_days: None,
        }
    }
}

impl std::fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("matching_enabled", &self.matching_enabled)
            .field("include_year", &self.include_year)
            .field("workers", &self.workers)
            .field("requests_per_second", &self.requests_per_second)
            .field("max_retries", &self.max_retries)
            .field("thresholds", &self.thresholds)
            .field("cache_path", &self.cache_path)
            .field("negative_cache_days", &self.negative_cache_days)
            .finish()
    }
}

impl ResolverConfig {
    /// Checks every value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] when matching is enabled without a
    /// usable key, or [`ConfigError::InvalidValue`] for the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matching_enabled && self.api_key().is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::invalid(
                "workers",
                self.workers,
                "a worker count between 1 and 64",
            ));
        }
        if !(0.0..=MAX_REQUESTS_PER_SECOND).contains(&self.requests_per_second) {
            return Err(ConfigError::invalid(
                "requests_per_second",
                self.requests_per_second,
                "a rate between 0 and 50",
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::invalid(
                "max_retries",
                self.max_retries,
                "a retry count between 0 and 10",
            ));
        }
        if self.negative_cache_days == Some(0) {
            return Err(ConfigError::invalid(
                "negative_cache_days",
                0,
                "at least one day, or unset to keep entries until purged",
            ));
        }
        self.thresholds.validate()
    }

    /// The API key, ignoring blank values.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Cache retention derived from `negative_cache_days`.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            negative_ttl: self
                .negative_cache_days
                .map(|days| Duration::from_secs(u64::from(days) * SECONDS_PER_DAY)),
        }
    }

    /// Retry policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retries.saturating_add(1))
    }

    /// Pool sizing.
    #[must_use]
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            workers: self.workers,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn with_key() -> ResolverConfig {
        ResolverConfig {
            api_key: Some("key".to_string()),
            ..ResolverConfig::default()
        }
    }

    #[test]
    fn test_default_with_key_is_valid() {
        assert!(with_key().validate().is_ok());
    }

    #[test]
    fn test_missing_key_is_fatal_when_matching() {
        let config = ResolverConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));

        let blank = ResolverConfig {
            api_key: Some("   ".to_string()),
            ..ResolverConfig::default()
        };
        assert!(matches!(blank.validate(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_missing_key_is_fine_without_matching() {
        let config = ResolverConfig {
            matching_enabled: false,
            ..ResolverConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_values_are_named() {
        let cases = [
            (
                ResolverConfig {
                    workers: 0,
                    ..with_key()
                },
                "workers",
            ),
            (
                ResolverConfig {
                    requests_per_second: -1.0,
                    ..with_key()
                },
                "requests_per_second",
            ),
            (
                ResolverConfig {
                    max_retries: 11,
                    ..with_key()
                },
                "max_retries",
            ),
            (
                ResolverConfig {
                    negative_cache_days: Some(0),
                    ..with_key()
                },
                "negative_cache_days",
            ),
        ];
        for (config, expected) in cases {
            match config.validate() {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_retry_policy_counts_first_attempt() {
        let config = ResolverConfig {
            max_retries: 2,
            ..with_key()
        };
        assert_eq!(config.retry_policy().max_attempts(), 3);
    }

    #[test]
    fn test_cache_policy_from_days() {
        let config = ResolverConfig {
            negative_cache_days: Some(7),
            ..with_key()
        };
        assert_eq!(
            config.cache_policy().negative_ttl,
            Some(Duration::from_secs(7 * 24 * 60 * 60))
        );
        assert_eq!(with_key().cache_policy().negative_ttl, None);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let debug = format!("{:?}", with_key());
        assert!(!debug.contains("\"key\""));
        assert!(debug.contains("<redacted>"));
    }
}
