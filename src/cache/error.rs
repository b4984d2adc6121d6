//! Error types for lookup cache operations.

use thiserror::Error;

use crate::db::DbError;
use crate::model::ResolutionStatus;

/// Errors that can occur while loading, writing or flushing the lookup cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Only resolved and no-match verdicts may be cached.
    #[error("refusing to cache '{key}' with status {status}: only resolved and no-match verdicts are cached")]
    NotCacheable {
        /// Cache key of the rejected record.
        key: String,
        /// Status that made the record ineligible.
        status: ResolutionStatus,
    },

    /// Serializing a record snapshot failed.
    #[error("failed to serialize cache record '{key}': {source}")]
    Serialize {
        /// Cache key of the record.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The backing store failed.
    #[error("cache store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Opening the backing database failed.
    #[error("cache database error: {0}")]
    Database(#[from] DbError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnresolvedReason;

    #[test]
    fn test_not_cacheable_message_names_status() {
        let err = CacheError::NotCacheable {
            key: "the office|-|-".to_string(),
            status: ResolutionStatus::Unresolved(UnresolvedReason::ProviderError),
        };
        let msg = err.to_string();
        assert!(msg.contains("the office|-|-"));
        assert!(msg.contains("provider_error"));
    }
}
