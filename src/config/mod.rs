//! Configuration module for the LCSC client.
//!
//! Provides base URL, partition (currency), timeout, rate limit, retry and
//! cache settings, either through [`ClientConfigBuilder`] or from the
//! environment.

use std::time::Duration;
use url::Url;

use crate::cache::CacheConfig;
use crate::errors::{LcscError, LcscResult};
use crate::resilience::{RateLimiterConfig, RetryConfig};

/// Default base URL for the LCSC API.
pub const DEFAULT_BASE_URL: &str = "https://wmsc.lcsc.com/ftps/wm";

/// Default request timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default sustained request rate.
pub const DEFAULT_RATE_LIMIT: f64 = 5.0;

/// Default currency, also used as the cache partition.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("lcsc-client/", env!("CARGO_PKG_VERSION"));

/// Configuration for the LCSC client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL for API requests.
    pub base_url: String,
    /// Currency code sent with every request and used to partition the cache.
    pub currency: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Rate limiter settings.
    pub rate_limit: RateLimiterConfig,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Cache settings.
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit: RateLimiterConfig::per_second(DEFAULT_RATE_LIMIT),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LCSC_BASE_URL`: custom base URL
    /// - `LCSC_CURRENCY`: currency code
    /// - `LCSC_TIMEOUT`: per-attempt timeout in seconds
    /// - `LCSC_RATE_LIMIT`: requests per second
    /// - `LCSC_MAX_RETRIES`: retries after the first attempt
    /// - `LCSC_CACHE_TTL`: default cache lifetime in seconds, `0` disables caching
    pub fn from_env() -> LcscResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> LcscResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = ClientConfigBuilder::new();

        if let Some(base_url) = lookup("LCSC_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        if let Some(currency) = lookup("LCSC_CURRENCY") {
            builder = builder.currency(currency);
        }
        if let Some(timeout) = lookup("LCSC_TIMEOUT") {
            builder = builder.timeout(Duration::from_secs(parse_var("LCSC_TIMEOUT", &timeout)?));
        }
        if let Some(rate) = lookup("LCSC_RATE_LIMIT") {
            builder = builder.rate_limit(parse_var("LCSC_RATE_LIMIT", &rate)?);
        }
        if let Some(retries) = lookup("LCSC_MAX_RETRIES") {
            builder = builder.max_retries(parse_var("LCSC_MAX_RETRIES", &retries)?);
        }
        if let Some(ttl) = lookup("LCSC_CACHE_TTL") {
            let secs: u64 = parse_var("LCSC_CACHE_TTL", &ttl)?;
            builder = if secs == 0 {
                builder.cache(CacheConfig::disabled())
            } else {
                builder.cache_ttl(Duration::from_secs(secs))
            };
        }

        builder.build()
    }

    /// Checks every setting.
    pub fn validate(&self) -> LcscResult<()> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            LcscError::configuration(format!("invalid base URL {}: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LcscError::configuration(format!(
                "base URL must use http or https, got {}",
                url.scheme()
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(LcscError::configuration("currency cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(LcscError::configuration("timeout must be positive"));
        }
        self.rate_limit.validate()?;
        self.retry.validate()?;
        if self.cache.enabled {
            self.cache.validate()?;
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> LcscResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LcscError::configuration(format!("invalid {name} value {value:?}: {e}")))
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Sets the currency code.
    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.config.currency = currency.into();
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Sets the sustained request rate, keeping any configured burst.
    #[must_use]
    pub fn rate_limit(mut self, requests_per_second: f64) -> Self {
        self.config.rate_limit.requests_per_second = requests_per_second;
        self
    }

    /// Sets the rate limiter config.
    #[must_use]
    pub fn rate_limit_config(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = config;
        self
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    /// Sets the retry config.
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.config.retry = config;
        self
    }

    /// Sets the cache config.
    #[must_use]
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    /// Sets the default cache lifetime and enables caching.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.enabled = true;
        self.config.cache.default_ttl = ttl;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> LcscResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
