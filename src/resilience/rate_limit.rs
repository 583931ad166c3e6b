//! Rate limiter implementation using token bucket algorithm.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::context::RequestContext;
use crate::errors::{LcscError, LcscResult};

/// Configuration for rate limiting.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Bucket capacity. Defaults to the rate, but never below one token.
    pub burst: Option<f64>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            burst: None,
        }
    }
}

impl RateLimiterConfig {
    /// Creates a config for the given rate with the default burst.
    pub fn per_second(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            burst: None,
        }
    }

    /// Sets the bucket capacity.
    #[must_use]
    pub fn burst(mut self, burst: f64) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Effective bucket capacity.
    pub fn capacity(&self) -> f64 {
        self.burst.unwrap_or(self.requests_per_second.max(1.0))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LcscResult<()> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(LcscError::configuration(format!(
                "rate limit must be a positive number of requests per second, got {}",
                self.requests_per_second
            )));
        }
        if let Some(burst) = self.burst {
            if !burst.is_finite() || burst < 1.0 {
                return Err(LcscError::configuration(format!(
                    "rate limit burst must be at least 1, got {burst}"
                )));
            }
        }
        Ok(())
    }
}

/// Token bucket state. Refilled lazily from elapsed time on every access.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token, or reports how long until one is available.
    fn try_take(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - self.tokens) / self.refill_rate;
            Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
        }
    }
}

/// Shared token-bucket gate bounding the outbound request rate.
///
/// One limiter is meant to be shared (behind an `Arc`) by every task talking
/// to the same upstream. Waiters are not served in FIFO order.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second`, with a full bucket.
    pub fn new(requests_per_second: f64) -> LcscResult<Self> {
        Self::with_config(&RateLimiterConfig::per_second(requests_per_second))
    }

    /// Creates a limiter from a config.
    pub fn with_config(config: &RateLimiterConfig) -> LcscResult<Self> {
        config.validate()?;
        Ok(Self {
            bucket: Mutex::new(TokenBucket::new(
                config.capacity(),
                config.requests_per_second,
            )),
        })
    }

    /// Waits until a token is available and consumes it.
    ///
    /// Returns [`LcscError::Cancelled`] if `ctx` ends first, in which case no
    /// token is consumed.
    pub async fn acquire(&self, ctx: &RequestContext) -> LcscResult<()> {
        loop {
            ctx.check()?;
            let wait = match self.bucket.lock().try_take() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            trace!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Waiting for rate limit token"
            );
            ctx.sleep(wait).await?;
        }
    }

    /// Consumes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.bucket.lock().try_take().is_ok()
    }

    /// Tokens currently in the bucket, after refilling.
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.refill();
        bucket.tokens
    }

    /// Maximum number of tokens the bucket holds.
    pub fn capacity(&self) -> f64 {
        self.bucket.lock().capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.bucket.lock().refill_rate
    }
}
