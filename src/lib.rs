//! LCSC API Client Library
//!
//! A client for the unofficial LCSC component catalogue API that keeps
//! callers inside the service's limits and avoids asking twice for the same
//! thing.
//!
//! # Features
//!
//! - **Rate limiting**: a shared token bucket bounds the outbound request rate
//! - **Retries**: bounded exponential backoff with jitter for 429/5xx and
//!   transient network failures, honouring `Retry-After`
//! - **Caching**: short-lived response cache with background expiry
//! - **Cancellation**: every wait observes the caller's [`RequestContext`]
//! - **Observability**: `tracing` events and request metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lcsc_client::{LcscClient, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LcscClient::builder()
//!         .currency("USD")
//!         .rate_limit(5.0)
//!         .build()?;
//!
//!     let ctx = RequestContext::new();
//!     let detail: serde_json::Value = client
//!         .get_json(&ctx, "product/detail", &[("productCode", "C8734")])
//!         .await?;
//!     println!("{detail}");
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Sharing limits across clients
//!
//! ```rust,no_run
//! use lcsc_client::{LcscClient, RateLimiter};
//! use lcsc_client::cache::MemoryCache;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn demo() -> Result<(), lcsc_client::LcscError> {
//! let limiter = Arc::new(RateLimiter::new(5.0)?);
//! let cache = Arc::new(MemoryCache::new(Duration::from_secs(300)));
//!
//! let usd = LcscClient::builder()
//!     .shared_rate_limiter(limiter.clone())
//!     .cache(cache.clone())
//!     .build()?;
//! let eur = LcscClient::builder()
//!     .currency("EUR")
//!     .shared_rate_limiter(limiter)
//!     .cache(cache)
//!     .build()?;
//! # let _ = (usd, eur);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod resilience;
pub mod transport;

// Re-exports for convenience
pub use cache::{Cache, CacheConfig, CachePolicy, MemoryCache};
pub use client::{decode_envelope, ApiEnvelope, LcscClient, LcscClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use context::RequestContext;
pub use errors::{CancelReason, LcscError, LcscResult};
pub use resilience::{
    RateLimiter, RateLimiterConfig, RequestOrchestrator, RetryConfig, RetryPolicy,
};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mock implementations for testing.
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
