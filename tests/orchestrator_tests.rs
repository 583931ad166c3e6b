//! Orchestrator behaviour through the public API only, with a scripted
//! transport and a custom cache implementation.

use async_trait::async_trait;
use bytes::Bytes;
use lcsc_client::{
    Cache, HttpRequest, HttpResponse, HttpTransport, LcscError, MemoryCache, RateLimiter,
    RequestContext, RequestOrchestrator, RetryConfig, TransportError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Replays scripted outcomes, then answers 200 with `{}`.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, "{}")))
    }
}

/// Counts operations on top of a memory cache.
#[derive(Debug)]
struct CountingCache {
    inner: MemoryCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingCache {
    fn new() -> Self {
        Self {
            inner: MemoryCache::new(Duration::from_secs(60)),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Cache for CountingCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await;
    }

    async fn delete(&self, key: &str) {
        self.inner.delete(key).await;
    }

    async fn clear(&self) {
        self.inner.clear().await;
    }

    async fn size(&self) -> usize {
        self.inner.size().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .initial_delay(Duration::from_millis(100))
        .jitter(0.0)
}

#[tokio::test(start_paused = true)]
async fn shared_limiter_spans_orchestrators() {
    let limiter = Arc::new(RateLimiter::new(2.0).unwrap());
    let build = || {
        RequestOrchestrator::builder(Arc::new(ScriptedTransport::default()))
            .rate_limiter(Arc::clone(&limiter))
            .build()
            .unwrap()
    };
    let first = build();
    let second = build();
    let ctx = RequestContext::new();
    let start = Instant::now();

    // Two tokens of burst, then one token every 500ms.
    for i in 0..6 {
        let orchestrator = if i % 2 == 0 { &first } else { &second };
        orchestrator
            .execute(&ctx, HttpRequest::get("product/detail").no_cache())
            .await
            .unwrap();
    }

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(1999), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2100), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn parent_cancel_stops_backoff() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(HttpResponse::new(503, "")),
        Ok(HttpResponse::new(503, "")),
    ]));
    let orchestrator = RequestOrchestrator::builder(transport.clone())
        .retry_config(
            RetryConfig::new()
                .initial_delay(Duration::from_secs(10))
                .max_delay(Duration::from_secs(10))
                .jitter(0.0),
        )
        .build()
        .unwrap();

    let parent = RequestContext::new();
    let child = parent.child();
    let canceller = parent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let err = orchestrator
        .execute(&child, HttpRequest::get("search/global"))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_slow_transport() {
    let transport = Arc::new(ScriptedTransport::slow(Duration::from_secs(30)));
    let orchestrator = RequestOrchestrator::builder(transport.clone())
        .build()
        .unwrap();
    let ctx = RequestContext::new().with_timeout(Duration::from_secs(2));

    let err = orchestrator
        .execute(&ctx, HttpRequest::get("product/detail"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LcscError::Cancelled {
            reason: lcsc_client::CancelReason::DeadlineExceeded
        }
    ));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_cache_is_used() {
    let cache = Arc::new(CountingCache::new());
    let transport = Arc::new(ScriptedTransport::default());
    let orchestrator = RequestOrchestrator::builder(transport.clone())
        .cache(cache.clone())
        .partition("EUR")
        .build()
        .unwrap();
    let ctx = RequestContext::new();
    let request = HttpRequest::get("product/detail").with_query("productCode", "C8734");

    let first = orchestrator.execute(&ctx, request.clone()).await.unwrap();
    let second = orchestrator.execute(&ctx, request.clone()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);
    assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
    assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
    assert_eq!(cache.size().await, 1);

    orchestrator.invalidate(&request).await;
    assert_eq!(cache.size().await, 0);
    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn failures_are_not_cached() {
    let cache = Arc::new(CountingCache::new());
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(HttpResponse::new(404, "missing")),
        Err(TransportError::Connection {
            message: "connection reset".into(),
        }),
    ]));
    let orchestrator = RequestOrchestrator::builder(transport.clone())
        .cache(cache.clone())
        .retry_config(fast_retry())
        .build()
        .unwrap();
    let ctx = RequestContext::new();

    let err = orchestrator
        .execute(&ctx, HttpRequest::get("product/detail"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(cache.sets.load(Ordering::SeqCst), 0);

    // Connection reset is retried, the following 200 is stored.
    orchestrator
        .execute(&ctx, HttpRequest::get("product/detail"))
        .await
        .unwrap();
    assert_eq!(transport.calls(), 3);
    assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn partitions_do_not_share_entries() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
    let transport = Arc::new(ScriptedTransport::default());
    let build = |partition: &str| {
        RequestOrchestrator::builder(transport.clone())
            .cache(Arc::clone(&cache))
            .partition(partition)
            .build()
            .unwrap()
    };
    let usd = build("USD");
    let eur = build("EUR");
    let ctx = RequestContext::new();

    usd.execute(&ctx, HttpRequest::get("product/detail")).await.unwrap();
    eur.execute(&ctx, HttpRequest::get("product/detail")).await.unwrap();
    usd.execute(&ctx, HttpRequest::get("product/detail")).await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(cache.size().await, 2);
    cache.close().await;
}
