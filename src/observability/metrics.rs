//! Metrics collection for the LCSC client.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector interface.
///
/// The orchestrator reports every logical request once and every transport
/// attempt, retry and cache lookup as they happen.
pub trait MetricsCollector: Send + Sync {
    /// Records a finished logical request.
    fn record_request(&self, success: bool, duration: Duration);

    /// Records one transport attempt.
    fn record_attempt(&self);

    /// Records a scheduled retry.
    fn record_retry(&self);

    /// Records a cache hit.
    fn record_cache_hit(&self);

    /// Records a cache miss.
    fn record_cache_miss(&self);

    /// Records an error by kind.
    fn record_error(&self, error_type: &str);

    /// Gets current metrics.
    fn get_metrics(&self) -> RequestMetrics;

    /// Resets all metrics.
    fn reset(&self);
}

/// Request metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetrics {
    /// Total logical requests.
    pub total_requests: u64,
    /// Successful requests.
    pub successful_requests: u64,
    /// Failed requests.
    pub failed_requests: u64,
    /// Transport attempts, including retries.
    pub attempts: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Requests served from the cache.
    pub cache_hits: u64,
    /// Cache lookups that missed.
    pub cache_misses: u64,
    /// Total latency in milliseconds.
    pub total_latency_ms: u64,
    /// Error counts by type.
    pub errors: HashMap<String, u64>,
}

impl RequestMetrics {
    /// Calculates average latency in milliseconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_latency_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.total_requests as f64
        }
    }

    /// Share of cache lookups that hit, as a percentage.
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / lookups as f64) * 100.0
        }
    }
}

/// Default metrics collector implementation.
#[derive(Default)]
pub struct DefaultMetricsCollector {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_latency_ms: AtomicU64,
    errors: RwLock<HashMap<String, u64>>,
}

impl DefaultMetricsCollector {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_request(&self, success: bool, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_latency_ms.fetch_add(millis, Ordering::Relaxed);
    }

    fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, error_type: &str) {
        *self.errors.write().entry(error_type.to_string()).or_insert(0) += 1;
    }

    fn get_metrics(&self) -> RequestMetrics {
        RequestMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            errors: self.errors.read().clone(),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.successful_requests,
            &self.failed_requests,
            &self.attempts,
            &self.retries,
            &self.cache_hits,
            &self.cache_misses,
            &self.total_latency_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.errors.write().clear();
    }
}

impl fmt::Debug for DefaultMetricsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultMetricsCollector")
            .field("total_requests", &self.total_requests.load(Ordering::Relaxed))
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .field("cache_hits", &self.cache_hits.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Collector that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn record_request(&self, _success: bool, _duration: Duration) {}
    fn record_attempt(&self) {}
    fn record_retry(&self) {}
    fn record_cache_hit(&self) {}
    fn record_cache_miss(&self) {}
    fn record_error(&self, _error_type: &str) {}

    fn get_metrics(&self) -> RequestMetrics {
        RequestMetrics::default()
    }

    fn reset(&self) {}
}
