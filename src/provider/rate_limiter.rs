//! Requests-per-second ceiling for provider calls.
//!
//! The [`RateLimiter`] spaces requests to the same host at least `1 / rps` apart.
//! It is shared by every worker in the pool, so the ceiling is global no matter how
//! many workers run. A 429 response pushes the host's next slot out by the
//! server's Retry-After delay.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use titlesync_core::provider::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::per_second(4.0));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://api.themoviedb.org/3/search/tv").await;
//!
//! // Second request to the same host waits 250ms
//! limiter.acquire("https://api.themoviedb.org/3/search/movie").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per host.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum honoured Retry-After value.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-host request spacing shared across worker tasks.
///
/// Wrap in `Arc` and hand one clone to each provider. Host state lives in a
/// `DashMap`; the timing itself is guarded by a per-host `tokio::sync::Mutex` so the
/// check-then-update of the next slot is atomic.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    disabled: bool,
    /// Arc lets callers drop the shard lock before awaiting the inner mutex.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// Earliest instant the next request may start. `None` until the first request.
    next_slot: Mutex<Option<Instant>>,
    cumulative_delay_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            next_slot: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}

impl RateLimiter {
    /// Creates a limiter with a fixed minimum interval between requests to one host.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = interval.as_millis()))]
    pub fn new(interval: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            interval,
            disabled: interval.is_zero(),
            hosts: DashMap::new(),
        }
    }

    /// Creates a limiter allowing `rps` requests per second per host.
    ///
    /// Zero, negative or non-finite values disable limiting.
    #[must_use]
    pub fn per_second(rps: f64) -> Self {
        if rps.is_finite() && rps > 0.0 {
            Self::new(Duration::from_secs_f64(1.0 / rps))
        } else {
            Self::disabled()
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        debug!("creating disabled rate limiter");
        Self {
            interval: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Minimum spacing between requests to one host.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a request to `url`'s host may start, then claims the slot.
    ///
    /// The first request to a host proceeds immediately. Server-imposed delays
    /// recorded through [`record_rate_limit`](Self::record_rate_limit) are honoured
    /// even when the limiter is otherwise disabled.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        let host = extract_host(url);
        tracing::Span::current().record("host", &host);

        if self.disabled && !self.hosts.contains_key(&host) {
            return;
        }

        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone();

        let mut slot = state.next_slot.lock().await;
        let now = Instant::now();

        if let Some(next) = *slot
            && next > now
        {
            let delay = next - now;
            let cumulative = state.add_cumulative_delay(delay);
            debug!(
                host = %host,
                delay_ms = delay.as_millis(),
                cumulative_ms = cumulative.as_millis(),
                "applying rate limit delay"
            );
            if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                warn!(
                    host = %host,
                    cumulative_delay_secs = cumulative.as_secs(),
                    "excessive rate limiting - consider lowering --workers or --rps"
                );
            }
            tokio::time::sleep(delay).await;
        }

        *slot = Some(Instant::now() + self.interval);
    }

    /// Pushes the host's next slot out by a server-mandated delay.
    #[instrument(skip(self), fields(host))]
    pub async fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = extract_host(url);
        tracing::Span::current().record("host", &host);

        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone();

        let mut slot = state.next_slot.lock().await;
        let blocked_until = Instant::now() + delay;
        if slot.is_none_or(|next| next < blocked_until) {
            *slot = Some(blocked_until);
        }

        let cumulative = state.add_cumulative_delay(delay);
        debug!(
            host = %host,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                host = %host,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - provider may be throttling this key"
            );
        }
    }
}

/// Extracts the lowercased host from a URL, or `"unknown"` when it has none.
///
/// # Examples
///
/// ```
/// use titlesync_core::provider::rate_limiter::extract_host;
///
/// assert_eq!(extract_host("https://API.themoviedb.org/3/search/tv"), "api.themoviedb.org");
/// assert_eq!(extract_host("http://127.0.0.1:8080/x"), "127.0.0.1");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value (integer seconds or HTTP-date).
///
/// Returns `None` if the value cannot be parsed. Values above one hour are capped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use titlesync_core::provider::rate_limiter::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}
