//! Observability module for the LCSC client.
//!
//! Provides logging setup and metrics collection for monitoring request
//! flow through the rate limiter, cache and retry loop.

mod logging;
mod metrics;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::{DefaultMetricsCollector, MetricsCollector, NoopMetricsCollector, RequestMetrics};

use std::time::Instant;

/// Request timer for measuring operation duration.
#[derive(Debug)]
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    /// Starts a new request timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the elapsed time.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
