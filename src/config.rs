//! Client configuration
//!
//! All tunables for the client live here: network timeout, cache sizing,
//! rate-limit window, retry budget, and batch behavior. Values come from the
//! defaults, a builder, or environment variables read once at construction.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::batch::FailurePolicy;

/// Errors raised when a configuration fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for [`RobloxClient`](crate::client::RobloxClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request network timeout.
    pub timeout: Duration,
    /// Default lifetime for cached responses.
    pub cache_ttl: Duration,
    /// Maximum number of cached responses.
    pub cache_capacity: usize,
    /// Maximum calls admitted per rate window.
    pub rate_limit_capacity: usize,
    /// Length of the sliding rate window.
    pub rate_limit_window: Duration,
    /// Retries after the initial attempt for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub retry_max_delay: Duration,
    /// Concurrent fetches within one batch call.
    pub batch_concurrency: usize,
    /// Maximum ids accepted by a single batch call.
    pub max_batch_size: usize,
    /// How batch calls treat per-id failures.
    pub failure_policy: FailurePolicy,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Redirect all endpoints to this base URL instead of the Roblox hosts.
    pub base_url: Option<String>,
    /// Emit debug-level request traces.
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
            rate_limit_capacity: 120,
            rate_limit_window: Duration::from_secs(60),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            batch_concurrency: 100,
            max_batch_size: 100,
            failure_policy: FailurePolicy::OmitFailed,
            user_agent: concat!("rbx-users/", env!("CARGO_PKG_VERSION")).to_string(),
            base_url: None,
            debug: false,
        }
    }
}

impl ClientConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Defaults overlaid with any `RBX_USERS_*` environment variables.
    ///
    /// Recognized: `RBX_USERS_TIMEOUT` (seconds), `RBX_USERS_CACHE_TTL`
    /// (seconds), `RBX_USERS_MAX_RETRIES`, `RBX_USERS_RATE_LIMIT`
    /// (calls per minute), `RBX_USERS_DEBUG`. Malformed values are ignored
    /// with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = read_env_u64("RBX_USERS_TIMEOUT") {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_env_u64("RBX_USERS_CACHE_TTL") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(retries) = read_env_u64("RBX_USERS_MAX_RETRIES") {
            config.max_retries = retries as u32;
        }
        if let Some(per_minute) = read_env_u64("RBX_USERS_RATE_LIMIT") {
            config.rate_limit_capacity = per_minute as usize;
        }
        if let Ok(value) = std::env::var("RBX_USERS_DEBUG") {
            match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.debug = true,
                "0" | "false" | "no" | "" => config.debug = false,
                other => warn!(value = other, "ignoring unrecognized RBX_USERS_DEBUG"),
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".into()));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be greater than 0".into()));
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::Invalid("cache_ttl must be greater than zero".into()));
        }
        if self.rate_limit_capacity == 0 {
            return Err(ConfigError::Invalid("rate_limit_capacity must be greater than 0".into()));
        }
        if self.rate_limit_window.is_zero() {
            return Err(ConfigError::Invalid("rate_limit_window must be greater than zero".into()));
        }
        if self.batch_concurrency == 0 {
            return Err(ConfigError::Invalid("batch_concurrency must be greater than 0".into()));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be greater than 0".into()));
        }
        Ok(())
    }
}

fn read_env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring malformed environment variable");
            None
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self { config: ClientConfig::default() }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn rate_limit(mut self, capacity: usize, window: Duration) -> Self {
        self.config.rate_limit_capacity = capacity;
        self.config.rate_limit_window = window;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry_base_delay = base;
        self.config.retry_max_delay = max;
        self
    }

    pub fn batch_concurrency(mut self, concurrency: usize) -> Self {
        self.config.batch_concurrency = concurrency;
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Send all requests to this base URL instead of the Roblox hosts.
    /// Intended for tests and proxies.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.rate_limit_capacity, 120);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.failure_policy, FailurePolicy::OmitFailed);
        assert!(config.base_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides_and_validates() {
        let config = ClientConfig::builder()
            .timeout(Duration::from_secs(5))
            .cache_capacity(10)
            .rate_limit(10, Duration::from_secs(1))
            .max_retries(0)
            .failure_policy(FailurePolicy::FailFast)
            .base_url("http://localhost:8080")
            .build()
            .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn builder_rejects_zero_values() {
        assert!(ClientConfig::builder().timeout(Duration::ZERO).build().is_err());
        assert!(ClientConfig::builder().cache_capacity(0).build().is_err());
        assert!(ClientConfig::builder().rate_limit(0, Duration::from_secs(60)).build().is_err());
        assert!(ClientConfig::builder().max_batch_size(0).build().is_err());
    }
}
