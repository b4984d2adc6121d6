//! Shared HTTP client construction policy for metadata providers.
//!
//! Every provider client gets the same connect/read timeouts, user agent and
//! gzip support.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use super::ProviderError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Project URL advertised in the User-Agent header.
const PROJECT_UA_URL: &str = "https://github.com/fierce/titlesync";

/// Connect and read timeouts applied to provider clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Whole-request timeout.
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

/// User-Agent shared by every provider client.
#[must_use]
pub fn standard_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("titlesync/{version} (+{PROJECT_UA_URL})")
}

/// Builds a provider HTTP client.
///
/// `provider` only appears in logs and errors.
///
/// # Errors
///
/// Returns [`ProviderError::ClientBuild`] when client construction fails.
pub fn build_provider_http_client(
    provider: &str,
    timeouts: HttpTimeouts,
) -> Result<Client, ProviderError> {
    match try_build_client(timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic while reading system proxy
            // settings; env proxies still apply on the fallback path.
            warn!(
                provider,
                "provider client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ProviderError::client_build(
                    provider,
                    "client construction panicked",
                )),
                Err(BuildClientFailure::Build(error)) => {
                    Err(ProviderError::client_build(provider, error))
                }
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(ProviderError::client_build(provider, error)),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(timeouts: HttpTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .user_agent(standard_user_agent())
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = first_env_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn first_env_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
