//! Client implementation for the LCSC API.

mod envelope;

pub use envelope::{decode_envelope, ApiEnvelope, SUCCESS_CODE};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::{Cache, CacheConfig, CachePolicy, MemoryCache};
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::errors::{LcscError, LcscResult};
use crate::observability::{DefaultMetricsCollector, MetricsCollector, RequestMetrics};
use crate::resilience::{RateLimiter, RequestOrchestrator, RetryConfig};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};

/// Main client for the LCSC API.
///
/// Every request goes through the shared rate limiter, the retry loop and,
/// for cacheable requests, the response cache. The client adds the default
/// headers (`Accept`, `User-Agent`, the currency cookie) to each request.
///
/// # Example
///
/// ```no_run
/// use lcsc_client::{LcscClient, RequestContext};
/// use std::time::Duration;
///
/// # async fn demo() -> Result<(), lcsc_client::LcscError> {
/// let client = LcscClient::builder().currency("EUR").build()?;
/// let ctx = RequestContext::new().with_timeout(Duration::from_secs(10));
///
/// let detail: serde_json::Value = client
///     .get_json(&ctx, "product/detail", &[("productCode", "C8734")])
///     .await?;
/// println!("{detail}");
///
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct LcscClient {
    config: ClientConfig,
    orchestrator: RequestOrchestrator,
    owned_cache: Option<Arc<dyn Cache>>,
    metrics: Arc<dyn MetricsCollector>,
}

impl LcscClient {
    /// Creates a client with default configuration.
    pub fn new() -> LcscResult<Self> {
        Self::builder().build()
    }

    /// Creates a client configured from `LCSC_*` environment variables.
    pub fn from_env() -> LcscResult<Self> {
        Self::builder().config(ClientConfig::from_env()?).build()
    }

    /// Creates a new client builder.
    pub fn builder() -> LcscClientBuilder {
        LcscClientBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the orchestrator that executes requests.
    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    /// Returns the shared rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.orchestrator.rate_limiter()
    }

    /// Returns the response cache, if enabled.
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.orchestrator.cache()
    }

    /// Returns a snapshot of the collected metrics.
    pub fn metrics(&self) -> RequestMetrics {
        self.metrics.get_metrics()
    }

    /// Adds the default headers to `request`, keeping any already set.
    pub fn prepare(&self, mut request: HttpRequest) -> HttpRequest {
        request.set_default_header("Accept", "application/json");
        request.set_default_header("User-Agent", self.config.user_agent.clone());
        request.set_default_header("Cookie", format!("currencyCode={}", self.config.currency));
        if request.body.is_some() {
            request.set_default_header("Content-Type", "application/json");
        }
        request
    }

    /// Executes a request and returns the raw response body.
    pub async fn execute(&self, ctx: &RequestContext, request: HttpRequest) -> LcscResult<Bytes> {
        let request = self.prepare(request);
        self.orchestrator.execute(ctx, request).await
    }

    /// Executes a request and decodes the enveloped payload.
    ///
    /// A response whose envelope reports an error is dropped from the cache
    /// so the next call asks the server again.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        request: HttpRequest,
    ) -> LcscResult<T> {
        let request = self.prepare(request);
        let body = self.orchestrator.execute(ctx, request.clone()).await?;

        match decode_envelope(&body) {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!(error = %err, path = %request.path, "Discarding undecodable response");
                self.orchestrator.invalidate(&request).await;
                Err(err)
            }
        }
    }

    /// Sends a GET with query parameters and decodes the enveloped payload.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
        params: &[(&str, &str)],
    ) -> LcscResult<T> {
        let request = HttpRequest::get(path).with_queries(params.iter().copied());
        self.request_json(ctx, request).await
    }

    /// Sends a JSON POST and decodes the enveloped payload.
    ///
    /// POSTs are not cached unless `cache_ttl` is given, in which case the
    /// body is part of the cache key.
    pub async fn post_json<B, T>(
        &self,
        ctx: &RequestContext,
        path: &str,
        body: &B,
        cache_ttl: Option<Duration>,
    ) -> LcscResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = HttpRequest::post(path).with_json(body)?;
        if let Some(ttl) = cache_ttl {
            request = request
                .with_cache_policy(CachePolicy::Always)
                .with_cache_ttl(ttl);
        }
        self.request_json(ctx, request).await
    }

    /// Stops the background work of the cache this client created.
    ///
    /// A cache passed in through [`LcscClientBuilder::cache`] belongs to the
    /// caller and is left running.
    pub async fn close(&self) {
        if let Some(cache) = &self.owned_cache {
            cache.close().await;
        }
    }
}

impl fmt::Debug for LcscClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LcscClient")
            .field("base_url", &self.config.base_url)
            .field("currency", &self.config.currency)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LcscClient`].
#[derive(Default)]
pub struct LcscClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    cache: Option<Arc<dyn Cache>>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl LcscClientBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
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

    /// Sets the sustained request rate.
    #[must_use]
    pub fn rate_limit(mut self, requests_per_second: f64) -> Self {
        self.config.rate_limit.requests_per_second = requests_per_second;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.config.retry = config;
        self
    }

    /// Sets the cache configuration for the cache the client creates.
    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    /// Turns response caching off.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self.cache = None;
        self
    }

    /// Uses a custom transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares a rate limiter with other clients.
    #[must_use]
    pub fn shared_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Uses a caller-owned cache instead of creating one.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the metrics collector.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the client.
    ///
    /// Must be called inside a Tokio runtime for the created cache to run its
    /// expiry sweep.
    pub fn build(self) -> LcscResult<LcscClient> {
        let config = self.config;
        config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new(config.base_url.as_str(), config.timeout).map_err(|e| {
                    LcscError::configuration(format!("failed to create HTTP transport: {e}"))
                })?,
            ),
        };

        let rate_limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::with_config(&config.rate_limit)?),
        };

        let (cache, owned_cache) = match self.cache {
            Some(shared) => (Some(shared), None),
            None if config.cache.enabled => {
                let cache: Arc<dyn Cache> = Arc::new(MemoryCache::with_config(&config.cache));
                (Some(Arc::clone(&cache)), Some(cache))
            }
            None => (None, None),
        };

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(DefaultMetricsCollector::new()));

        let mut orchestrator = RequestOrchestrator::builder(transport)
            .rate_limiter(rate_limiter)
            .retry_config(config.retry.clone())
            .partition(config.currency.clone())
            .metrics(Arc::clone(&metrics));
        if let Some(cache) = cache {
            orchestrator = orchestrator.cache(cache);
        }

        Ok(LcscClient {
            orchestrator: orchestrator.build()?,
            config,
            owned_cache,
            metrics,
        })
    }
}
