//! Request orchestrator combining caching, rate limiting and retries.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{parse_retry_after, Outcome, RateLimiter, RetryConfig, RetryPolicy};
use crate::cache::{cache_key, Cache};
use crate::context::RequestContext;
use crate::errors::{LcscError, LcscResult};
use crate::observability::{MetricsCollector, NoopMetricsCollector, RequestTimer};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Drives one logical request through cache, rate limiter, transport and
/// retry loop.
///
/// The rate limiter and cache are shared handles: several orchestrators (or
/// clients) can draw from the same budget and cache.
pub struct RequestOrchestrator {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    cache: Option<Arc<dyn Cache>>,
    partition: String,
    metrics: Arc<dyn MetricsCollector>,
}

impl RequestOrchestrator {
    /// Creates a builder around the given transport.
    pub fn builder(transport: Arc<dyn HttpTransport>) -> RequestOrchestratorBuilder {
        RequestOrchestratorBuilder::new(transport)
    }

    /// Returns the shared rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the cache, if one is configured.
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Returns the cache partition tag.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Returns the cache key for a request, or `None` if it bypasses the cache.
    pub fn cache_key_for(&self, request: &HttpRequest) -> Option<String> {
        self.cache.as_ref()?;
        request
            .cache_policy
            .allows(request.method)
            .then(|| cache_key(request, &self.partition))
    }

    /// Removes any cached response for `request`.
    pub async fn invalidate(&self, request: &HttpRequest) {
        if let (Some(cache), Some(key)) = (&self.cache, self.cache_key_for(request)) {
            cache.delete(&key).await;
        }
    }

    /// Executes a request, returning the body of the first 2xx response.
    ///
    /// Cache hits return without touching the rate limiter or transport.
    /// Retryable failures are retried up to the policy's limit, after which
    /// [`LcscError::RetriesExhausted`] wraps the last failure. Fatal failures
    /// and cancellation return immediately.
    #[instrument(
        skip(self, ctx, request),
        fields(method = %request.method, path = %request.path, request_id = %Uuid::new_v4())
    )]
    pub async fn execute(&self, ctx: &RequestContext, request: HttpRequest) -> LcscResult<Bytes> {
        let timer = RequestTimer::start();
        let result = self.run(ctx, &request).await;

        self.metrics.record_request(result.is_ok(), timer.elapsed());
        if let Err(err) = &result {
            self.metrics.record_error(err.kind());
        }
        result
    }

    async fn run(&self, ctx: &RequestContext, request: &HttpRequest) -> LcscResult<Bytes> {
        let key = self.cache_key_for(request);

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(body) = cache.get(key).await {
                debug!(key = %key, "Cache hit");
                self.metrics.record_cache_hit();
                return Ok(body);
            }
            debug!(key = %key, "Cache miss");
            self.metrics.record_cache_miss();
        }

        let max_retries = self.retry_policy.max_retries();
        let mut attempt: u32 = 0;

        loop {
            self.rate_limiter.acquire(ctx).await?;

            attempt += 1;
            self.metrics.record_attempt();
            debug!(attempt, "Sending request");

            let result = ctx.run(self.transport.send(request.clone())).await?;
            let outcome = self.retry_policy.classify(&result);

            let err = match result {
                Ok(response) if outcome == Outcome::Success => {
                    if let (Some(cache), Some(key)) = (&self.cache, &key) {
                        let ttl = request.cache_ttl.unwrap_or(Duration::ZERO);
                        cache.set(key, response.body.clone(), ttl).await;
                    }
                    return Ok(response.body);
                }
                Ok(response) => status_error(outcome, &response),
                Err(source) if outcome.is_retryable() => LcscError::TransientTransport { source },
                Err(source) => LcscError::FatalTransport { source },
            };

            if !outcome.is_retryable() {
                debug!(error = %err, "Request failed without retry");
                return Err(err);
            }

            if attempt > max_retries {
                warn!(attempts = attempt, error = %err, "Retries exhausted");
                return Err(LcscError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.retry_policy.delay_for(attempt - 1, err.retry_after());
            info!(
                attempt,
                max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying after error"
            );
            self.metrics.record_retry();
            ctx.sleep(delay).await?;
        }
    }
}

fn status_error(outcome: Outcome, response: &HttpResponse) -> LcscError {
    if outcome == Outcome::RetryableStatus {
        LcscError::RetryableStatus {
            status: response.status,
            message: response.reason(),
            retry_after: response.header("retry-after").and_then(parse_retry_after),
        }
    } else {
        LcscError::FatalStatus {
            status: response.status,
            message: response.reason(),
            body: response.text().map(ToOwned::to_owned),
        }
    }
}

impl fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("rate_limiter", &self.rate_limiter)
            .field("retry", self.retry_policy.config())
            .field("cache", &self.cache)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestOrchestrator`].
pub struct RequestOrchestratorBuilder {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Option<Arc<RateLimiter>>,
    retry_config: RetryConfig,
    cache: Option<Arc<dyn Cache>>,
    partition: String,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl RequestOrchestratorBuilder {
    /// Creates a builder around the given transport.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            rate_limiter: None,
            retry_config: RetryConfig::default(),
            cache: None,
            partition: String::new(),
            metrics: None,
        }
    }

    /// Shares an existing rate limiter.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Shares a cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the tag that partitions cache keys, such as a currency code.
    #[must_use]
    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Sets the metrics collector.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the orchestrator, validating the retry configuration.
    ///
    /// Without an explicit limiter, a private one allowing 5 requests per
    /// second is created.
    pub fn build(self) -> LcscResult<RequestOrchestrator> {
        let rate_limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::new(5.0)?),
        };

        Ok(RequestOrchestrator {
            transport: self.transport,
            rate_limiter,
            retry_policy: RetryPolicy::new(self.retry_config)?,
            cache: self.cache,
            partition: self.partition,
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(NoopMetricsCollector)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePolicy, MemoryCache};
    use crate::errors::CancelReason;
    use crate::mocks::{MockResponse, MockTransport};
    use crate::observability::DefaultMetricsCollector;
    use crate::transport::TransportError;
    use tokio::time::Instant;

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .max_retries(3)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(1))
            .jitter(0.0)
    }

    fn orchestrator(transport: &Arc<MockTransport>) -> RequestOrchestrator {
        RequestOrchestrator::builder(transport.clone())
            .rate_limiter(Arc::new(RateLimiter::new(1000.0).unwrap()))
            .retry_config(fast_retry())
            .partition("USD")
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::ok(r#"{"code":200}"#));

        let body = orchestrator(&transport)
            .execute(&RequestContext::new(), HttpRequest::get("ping"))
            .await
            .unwrap();

        assert_eq!(&body[..], br#"{"code":200}"#);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling() {
        let transport = Arc::new(MockTransport::new().with_default(MockResponse::status(503)));
        let start = Instant::now();

        let err = orchestrator(&transport)
            .execute(&RequestContext::new(), HttpRequest::get("search"))
            .await
            .unwrap_err();

        assert_eq!(transport.request_count(), 4);
        match err {
            LcscError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, LcscError::RetryableStatus { status: 503, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // 100 + 200 + 400 ms of backoff.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(720), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_status_not_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::status(404).with_body("missing"));

        let err = orchestrator(&transport)
            .execute(&RequestContext::new(), HttpRequest::get("product/detail"))
            .await
            .unwrap_err();

        assert_eq!(transport.request_count(), 1);
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            LcscError::FatalStatus { status: 404, body: Some(ref b), .. } if b == "missing"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_transport_then_success() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::error(TransportError::Timeout { timeout: None }));
        transport.push(MockResponse::error(TransportError::Connection {
            message: "connection reset".into(),
        }));
        transport.push(MockResponse::ok("done"));

        let body = orchestrator(&transport)
            .execute(&RequestContext::new(), HttpRequest::get("x"))
            .await
            .unwrap();

        assert_eq!(&body[..], b"done");
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_transport_not_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::error(TransportError::Dns {
            message: "no such host".into(),
        }));

        let err = orchestrator(&transport)
            .execute(&RequestContext::new(), HttpRequest::get("x"))
            .await
            .unwrap_err();

        assert_eq!(transport.request_count(), 1);
        assert!(matches!(err, LcscError::FatalTransport { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_config() {
        let transport = Arc::new(MockTransport::new().with_default(MockResponse::status(500)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap();

        let err = orchestrator
            .execute(&RequestContext::new(), HttpRequest::get("x"))
            .await
            .unwrap_err();

        assert_eq!(transport.request_count(), 1);
        assert!(matches!(err, LcscError::RetriesExhausted { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_used() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::status(429).with_header("Retry-After", "1"));
        transport.push(MockResponse::ok("ok"));
        let start = Instant::now();

        orchestrator(&transport)
            .execute(&RequestContext::new(), HttpRequest::get("x"))
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1020), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_transport_and_limiter() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::ok("cached"));
        let limiter = Arc::new(RateLimiter::new(1.0).unwrap());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .rate_limiter(limiter.clone())
            .cache(cache.clone())
            .partition("USD")
            .build()
            .unwrap();
        let request = HttpRequest::get("product/detail").with_query("productCode", "C8734");

        let first = orchestrator
            .execute(&RequestContext::new(), request.clone())
            .await
            .unwrap();
        let tokens_after_first = limiter.available_tokens();
        let second = orchestrator
            .execute(&RequestContext::new(), request)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.request_count(), 1);
        assert!((limiter.available_tokens() - tokens_after_first).abs() < 1e-9);
        assert_eq!(cache.size().await, 1);
        cache.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::status(400));
        transport.push(MockResponse::ok("fresh"));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .cache(cache.clone())
            .build()
            .unwrap();

        let ctx = RequestContext::new();
        assert!(orchestrator.execute(&ctx, HttpRequest::get("x")).await.is_err());
        let body = orchestrator.execute(&ctx, HttpRequest::get("x")).await.unwrap();

        assert_eq!(&body[..], b"fresh");
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_bypasses_cache_unless_forced() {
        let transport = Arc::new(MockTransport::new().with_default(MockResponse::ok("r")));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .rate_limiter(Arc::new(RateLimiter::new(1000.0).unwrap()))
            .cache(cache.clone())
            .build()
            .unwrap();
        let ctx = RequestContext::new();
        let post = HttpRequest::post("search/global").with_body(r#"{"keyword":"lm358"}"#);

        orchestrator.execute(&ctx, post.clone()).await.unwrap();
        orchestrator.execute(&ctx, post.clone()).await.unwrap();
        assert_eq!(transport.request_count(), 2);
        assert_eq!(cache.size().await, 0);

        let forced = post.with_cache_policy(CachePolicy::Always);
        orchestrator.execute(&ctx, forced.clone()).await.unwrap();
        orchestrator.execute(&ctx, forced).await.unwrap();
        assert_eq!(transport.request_count(), 3);
        assert_eq!(cache.size().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_ttl_applied() {
        let transport = Arc::new(MockTransport::new().with_default(MockResponse::ok("r")));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(600)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .cache(cache.clone())
            .build()
            .unwrap();
        let ctx = RequestContext::new();
        let request = HttpRequest::get("x").with_cache_ttl(Duration::from_secs(5));

        orchestrator.execute(&ctx, request.clone()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        orchestrator.execute(&ctx, request).await.unwrap();

        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(MockTransport::new().with_default(MockResponse::status(503)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .retry_config(
                RetryConfig::new()
                    .initial_delay(Duration::from_secs(30))
                    .max_delay(Duration::from_secs(60))
                    .jitter(0.0),
            )
            .build()
            .unwrap();
        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = orchestrator
            .execute(&ctx, HttpRequest::get("x"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LcscError::Cancelled {
                reason: CancelReason::Cancelled
            }
        ));
        assert_eq!(transport.request_count(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_transport() {
        let transport = Arc::new(
            MockTransport::new().with_default(MockResponse::ok("slow").with_delay(Duration::from_secs(10))),
        );
        let orchestrator = RequestOrchestrator::builder(transport.clone()).build().unwrap();
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(200));

        let err = orchestrator
            .execute(&ctx, HttpRequest::get("x"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LcscError::Cancelled {
                reason: CancelReason::DeadlineExceeded
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_sends_nothing() {
        let transport = Arc::new(MockTransport::new());
        let ctx = RequestContext::new();
        ctx.cancel();

        let err = orchestrator(&transport)
            .execute(&ctx, HttpRequest::get("x"))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_recorded() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockResponse::status(502));
        transport.push(MockResponse::ok("ok"));
        let metrics = Arc::new(DefaultMetricsCollector::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .retry_config(fast_retry())
            .cache(cache)
            .metrics(metrics.clone())
            .build()
            .unwrap();
        let ctx = RequestContext::new();

        orchestrator.execute(&ctx, HttpRequest::get("x")).await.unwrap();
        orchestrator.execute(&ctx, HttpRequest::get("x")).await.unwrap();

        let snapshot = metrics.get_metrics();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_drops_entry() {
        let transport = Arc::new(MockTransport::new().with_default(MockResponse::ok("r")));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let orchestrator = RequestOrchestrator::builder(transport.clone())
            .cache(cache.clone())
            .build()
            .unwrap();
        let request = HttpRequest::get("x");

        orchestrator
            .execute(&RequestContext::new(), request.clone())
            .await
            .unwrap();
        assert_eq!(cache.size().await, 1);

        orchestrator.invalidate(&request).await;
        assert_eq!(cache.size().await, 0);
    }

    #[test]
    fn test_invalid_retry_config_rejected() {
        let transport = Arc::new(MockTransport::new());
        let result = RequestOrchestrator::builder(transport)
            .retry_config(RetryConfig::new().multiplier(0.5))
            .build();

        assert!(matches!(result, Err(LcscError::Configuration { .. })));
    }
}
