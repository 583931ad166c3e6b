//! Retry policy implementation.
//!
//! The policy is pure: it classifies attempt outcomes and computes backoff
//! delays, but never sleeps or calls the transport itself. The orchestrator
//! drives the loop.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

use crate::errors::{LcscError, LcscResult, RETRYABLE_STATUSES};
use crate::transport::{HttpResponse, TransportError};

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay, before jitter.
    pub max_delay: Duration,
    /// Delay multiplier for exponential backoff.
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`; delays vary by up to this share either way.
    pub jitter: f64,
    /// Wait for the server's `Retry-After` instead of the computed backoff.
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier.
    #[must_use]
    pub fn multiplier(mut self, mult: f64) -> Self {
        self.multiplier = mult;
        self
    }

    /// Sets the jitter fraction.
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets whether `Retry-After` overrides the computed backoff.
    #[must_use]
    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Checks the parameter ranges.
    pub fn validate(&self) -> LcscResult<()> {
        if self.initial_delay.is_zero() {
            return Err(LcscError::configuration("retry initial delay must be positive"));
        }
        if self.max_delay < self.initial_delay {
            return Err(LcscError::configuration(format!(
                "retry max delay {:?} is shorter than initial delay {:?}",
                self.max_delay, self.initial_delay
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(LcscError::configuration(format!(
                "retry multiplier must be greater than 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(LcscError::configuration(format!(
                "retry jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

/// Classification of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx response.
    Success,
    /// Transport failure worth another attempt.
    RetryableTransportError,
    /// 429 or a retryable 5xx.
    RetryableStatus,
    /// Transport failure not worth another attempt.
    FatalTransportError,
    /// Any other non-2xx status.
    FatalStatus,
}

impl Outcome {
    /// Returns true if the orchestrator should try again.
    pub fn is_retryable(self) -> bool {
        matches!(self, Outcome::RetryableTransportError | Outcome::RetryableStatus)
    }
}

/// Retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a new retry policy from a validated config.
    pub fn new(config: RetryConfig) -> LcscResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Maximum number of retries after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Decides whether an attempt should be retried.
    ///
    /// When a status is present it decides on its own, otherwise the
    /// transport error's transience does.
    pub fn should_retry(&self, error: Option<&TransportError>, status: Option<u16>) -> bool {
        match status {
            Some(status) => RETRYABLE_STATUSES.contains(&status),
            None => error.is_some_and(TransportError::is_transient),
        }
    }

    /// Classifies the result of one transport call.
    pub fn classify(&self, result: &Result<HttpResponse, TransportError>) -> Outcome {
        match result {
            Ok(response) if self.should_retry(None, Some(response.status)) => {
                Outcome::RetryableStatus
            }
            Ok(response) if response.is_success() => Outcome::Success,
            Ok(_) => Outcome::FatalStatus,
            Err(err) if self.should_retry(Some(err), None) => Outcome::RetryableTransportError,
            Err(_) => Outcome::FatalTransportError,
        }
    }

    /// Backoff before retry number `attempt` (zero-based), with jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt).as_secs_f64();
        let jitter = self.config.jitter;
        let delay = if jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-1.0..=1.0);
            capped * (1.0 + spread * jitter)
        } else {
            capped
        };
        Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Delay before the next attempt, preferring the server's `Retry-After`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) if self.config.respect_retry_after => wait.min(self.config.max_delay),
            _ => self.backoff_delay(attempt),
        }
    }

    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub(crate) fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        let max = self.config.max_delay.as_secs_f64();
        if base.is_finite() && base < max {
            Duration::try_from_secs_f64(base).unwrap_or(self.config.max_delay)
        } else {
            self.config.max_delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }
}

/// Parses a `Retry-After` header value: delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
