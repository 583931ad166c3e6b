//! Response caching.
//!
//! The orchestrator only sees the narrow [`Cache`] capability, so any
//! expiring key/value store can sit behind it. [`MemoryCache`] is the
//! process-local implementation.

mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use url::form_urlencoded;

use crate::errors::{LcscError, LcscResult};
use crate::transport::{HttpMethod, HttpRequest};

/// Default lifetime of a cached response.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default lifetime for search-style responses.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(5 * 60);

/// Default lifetime for product detail responses.
pub const DEFAULT_DETAILS_TTL: Duration = Duration::from_secs(10 * 60);

/// Default interval between expiry sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Expiring key/value store for response bodies.
///
/// Reads never return an entry past its expiry, whether or not a background
/// sweep has removed it yet.
#[async_trait]
pub trait Cache: Send + Sync + fmt::Debug {
    /// Returns the value if present and not expired.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Stores a value, replacing any existing entry. A zero `ttl` means the
    /// cache's default lifetime.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration);

    /// Removes an entry.
    async fn delete(&self, key: &str);

    /// Removes all entries.
    async fn clear(&self);

    /// Number of stored entries.
    async fn size(&self) -> usize;

    /// Stops background maintenance. Idempotent.
    async fn close(&self);
}

/// Whether a request takes part in caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Cache safe methods (GET, HEAD) only.
    #[default]
    Auto,
    /// Never read from or write to the cache.
    Bypass,
    /// Cache regardless of method. The body is folded into the key.
    Always,
}

impl CachePolicy {
    /// Returns true if a request with `method` may use the cache.
    pub fn allows(self, method: HttpMethod) -> bool {
        match self {
            CachePolicy::Auto => method.is_safe(),
            CachePolicy::Bypass => false,
            CachePolicy::Always => true,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether the client creates a cache at all.
    pub enabled: bool,
    /// Lifetime used when a request does not specify one.
    pub default_ttl: Duration,
    /// Suggested lifetime for search responses.
    pub search_ttl: Duration,
    /// Suggested lifetime for product detail responses.
    pub details_ttl: Duration,
    /// Interval between expiry sweeps.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: DEFAULT_CACHE_TTL,
            search_ttl: DEFAULT_SEARCH_TTL,
            details_ttl: DEFAULT_DETAILS_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// A config with caching turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the default lifetime.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the sweep interval.
    #[must_use]
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LcscResult<()> {
        if self.default_ttl.is_zero() {
            return Err(LcscError::configuration("cache default TTL must be positive"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(LcscError::configuration(
                "cache cleanup interval must be positive",
            ));
        }
        Ok(())
    }
}

/// Derives the cache key for a request.
///
/// The key is `METHOD:partition:path?query`, with query parameters sorted by
/// name so that parameter order does not split the cache. Requests with a
/// body get a SHA-256 digest of it appended.
pub fn cache_key(request: &HttpRequest, partition: &str) -> String {
    let mut params: Vec<(&str, &str)> = request
        .query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(b.0));
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();

    let mut key = format!(
        "{}:{}:{}?{}",
        request.method, partition, request.path, query
    );
    if let Some(body) = request.body.as_ref().filter(|b| !b.is_empty()) {
        key.push('#');
        key.push_str(&hex::encode(Sha256::digest(body)));
    }
    key
}
