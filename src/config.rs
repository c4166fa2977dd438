/**
 * Configuration constants and runtime settings for fetchers and realtime channels
 */
use std::collections::BTreeMap;
use std::time::Duration;

/// Client-side cache entries older than this are refetched
pub const CLIENT_CACHE_TTL_SECS: u64 = 300; // 5 minutes

/// Total attempts (first try included) for API-format fetches
pub const MAX_API_ATTEMPTS: u32 = 3;

/// Base of the `base * 2^attempt` API backoff, in milliseconds
pub const API_BACKOFF_BASE_MS: u64 = 1000;

/// Consecutive push-channel failures before the subscription gives up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Initial push-channel reconnect delay in milliseconds
pub const RECONNECT_BASE_MS: u64 = 1000;

/// Upper bound on push-channel reconnect delay in seconds
pub const MAX_RECONNECT_BACKOFF_SECS: u64 = 30;

/// Path prefix of the data endpoint
pub const DEFAULT_API_BASE_PATH: &str = "/api/data";

/// Origin used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

pub const ENV_BASE_URL: &str = "DATAFETCH_BASE_URL";
pub const ENV_API_BASE_PATH: &str = "DATAFETCH_API_BASE_PATH";
pub const ENV_API_KEY: &str = "DATAFETCH_API_KEY";
pub const ENV_API_HOST: &str = "DATAFETCH_API_HOST";

/// Header names carrying the optional API credential pair
pub const API_KEY_HEADER: &str = "X-API-Key";
pub const API_HOST_HEADER: &str = "X-API-Host";

/// Retry ladder for API-format fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_API_ATTEMPTS,
            base_delay: Duration::from_millis(API_BACKOFF_BASE_MS),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay after the 0-based `attempt` failed.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// Reconnect schedule for push-channel subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(RECONNECT_BASE_MS),
            max_delay: Duration::from_secs(MAX_RECONNECT_BACKOFF_SECS),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next connection attempt, given consecutive failures so far (>= 1).
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

/// Settings shared by every fetcher created from one context
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub api_base_path: String,
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    pub client_cache_ttl: Duration,
    pub retry: RetryPolicy,
    pub reconnect: ReconnectPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_base_path: DEFAULT_API_BASE_PATH.to_string(),
            api_key: None,
            api_host: None,
            client_cache_ttl: Duration::from_secs(CLIENT_CACHE_TTL_SECS),
            retry: RetryPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl FetchConfig {
    /// Defaults overridden by `DATAFETCH_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`FetchConfig::from_env`] but reading from an arbitrary source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Self {
            base_url: non_empty(ENV_BASE_URL).unwrap_or(defaults.base_url),
            api_base_path: non_empty(ENV_API_BASE_PATH).unwrap_or(defaults.api_base_path),
            api_key: non_empty(ENV_API_KEY),
            api_host: non_empty(ENV_API_HOST),
            ..defaults
        }
    }

    /// Header pair attached to API-format requests, when configured.
    #[must_use]
    pub fn api_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(key) = &self.api_key {
            headers.insert(API_KEY_HEADER.to_string(), key.clone());
        }
        if let Some(host) = &self.api_host {
            headers.insert(API_HOST_HEADER.to_string(), host.clone());
        }
        headers
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(CLIENT_CACHE_TTL_SECS > 0, "CLIENT_CACHE_TTL_SECS must be greater than 0");
    assert!(MAX_API_ATTEMPTS > 0, "MAX_API_ATTEMPTS must be greater than 0");
    assert!(MAX_RECONNECT_ATTEMPTS > 0, "MAX_RECONNECT_ATTEMPTS must be greater than 0");
    assert!(MAX_RECONNECT_BACKOFF_SECS > 0, "MAX_RECONNECT_BACKOFF_SECS must be greater than 0");
    assert!(RECONNECT_BASE_MS > 0, "RECONNECT_BASE_MS must be greater than 0");
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_retry_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_reconnect_delay_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "https://example.test"),
            (ENV_API_KEY, "secret"),
            (ENV_API_HOST, "  "),
        ]);
        let config = FetchConfig::from_lookup(|name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.base_url, "https://example.test");
        assert_eq!(config.api_base_path, DEFAULT_API_BASE_PATH);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert!(config.api_host.is_none());

        let headers = config.api_headers();
        assert_eq!(headers.get(API_KEY_HEADER).map(String::as_str), Some("secret"));
        assert!(!headers.contains_key(API_HOST_HEADER));
    }
}
