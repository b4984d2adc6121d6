//! Error types for metadata provider calls.
//!
//! Every variant is a transport or protocol failure. "The provider answered
//! with zero candidates" is not an error; it is an empty result.

use thiserror::Error;

/// Errors that can occur while querying a metadata provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level failure (DNS, connection refused, TLS, reset).
    #[error("network error calling {endpoint}: {message}")]
    Network {
        /// Endpoint that was being called.
        endpoint: String,
        /// Description of the underlying failure.
        message: String,
    },

    /// The request did not complete in time.
    #[error("timeout calling {endpoint}")]
    Timeout {
        /// Endpoint that timed out.
        endpoint: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus {
        /// Endpoint that returned the status.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Raw Retry-After header value, if the server sent one.
        retry_after: Option<String>,
    },

    /// The response body was not the expected JSON shape.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// Endpoint whose response failed to decode.
        endpoint: String,
        /// Decoder message.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client construction failed for {provider}: {message}")]
    ClientBuild {
        /// Provider name.
        provider: String,
        /// Builder error text.
        message: String,
    },
}

impl ProviderError {
    /// Creates a network error.
    pub fn network(endpoint: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(endpoint: impl Into<String>) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            endpoint: endpoint.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error carrying a Retry-After header value.
    pub fn http_status_with_retry_after(
        endpoint: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            endpoint: endpoint.into(),
            status,
            retry_after,
        }
    }

    /// Creates a decode error.
    pub fn decode(endpoint: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Creates a client construction error.
    pub fn client_build(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ClientBuild {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Maps a reqwest error onto the taxonomy, keeping timeouts distinct.
    ///
    /// The request URL is stripped from the message since it carries the API key.
    pub fn from_reqwest(endpoint: impl Into<String>, error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            Self::timeout(endpoint)
        } else if error.is_decode() {
            Self::decode(endpoint, error)
        } else {
            Self::network(endpoint, error)
        }
    }
}
