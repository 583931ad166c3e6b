//! Resilience layer for the LCSC client.
//!
//! Provides the shared rate limiter, the retry policy and the orchestrator
//! that runs requests through both, with the response cache in front.

mod orchestrator;
mod rate_limit;
mod retry;

pub use orchestrator::{RequestOrchestrator, RequestOrchestratorBuilder};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use retry::{parse_retry_after, Outcome, RetryConfig, RetryPolicy};
