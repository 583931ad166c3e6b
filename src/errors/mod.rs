//! Error types for the LCSC client.
//!
//! Every request terminates in exactly one of a successful body or one
//! [`LcscError`]. The variants mirror the decisions the orchestrator makes:
//! whether an attempt failed at the transport or at the status level, whether
//! that failure was worth retrying, and whether the retry budget ran out.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for LCSC operations.
pub type LcscResult<T> = Result<T, LcscError>;

/// HTTP statuses the retry policy treats as retryable.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Why an operation stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("cancelled by caller"),
            CancelReason::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Error type for LCSC client operations.
#[derive(Debug, Error)]
pub enum LcscError {
    /// The caller cancelled or the deadline passed while waiting.
    #[error("Request cancelled: {reason}")]
    Cancelled {
        /// What ended the wait.
        reason: CancelReason,
    },

    /// A transport failure the policy considers transient.
    ///
    /// Only surfaces to callers wrapped in [`LcscError::RetriesExhausted`].
    #[error("Transient transport error: {source}")]
    TransientTransport {
        /// Underlying transport failure.
        source: TransportError,
    },

    /// A transport failure that is not worth retrying.
    #[error("Transport error: {source}")]
    FatalTransport {
        /// Underlying transport failure.
        source: TransportError,
    },

    /// The server answered with a retryable status (429 or a retryable 5xx).
    #[error("Retryable HTTP status {status}: {message}")]
    RetryableStatus {
        /// HTTP status code.
        status: u16,
        /// Short description, usually the reason phrase.
        message: String,
        /// Server supplied `Retry-After`, if any.
        retry_after: Option<Duration>,
    },

    /// The server answered with a non-2xx status outside the retryable set.
    #[error("HTTP status {status}: {message}")]
    FatalStatus {
        /// HTTP status code.
        status: u16,
        /// Short description, usually the reason phrase.
        message: String,
        /// Raw response body, when it was valid UTF-8.
        body: Option<String>,
    },

    /// Every permitted attempt failed with a retryable error.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of transport attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last: Box<LcscError>,
    },

    /// The response body could not be decoded.
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// Decoder error message.
        message: String,
        /// Raw response body, when it was valid UTF-8.
        body: Option<String>,
    },

    /// The API envelope reported a non-success code.
    #[error("API error (code {code}): {message}")]
    Api {
        /// Envelope `code` field.
        code: i64,
        /// Envelope `msg` field.
        message: String,
    },

    /// Invalid client configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// Invalid request parameters.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation issue.
        message: String,
    },
}

impl LcscError {
    /// Returns true if this error class is retried by the orchestrator.
    pub fn is_retryable(&self) -> bool {
        match self {
            LcscError::TransientTransport { .. } | LcscError::RetryableStatus { .. } => true,
            LcscError::Api { code, .. } => u16::try_from(*code)
                .map(|code| RETRYABLE_STATUSES.contains(&code))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Returns true if the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LcscError::FatalStatus { status: 404, .. } | LcscError::Api { code: 404, .. }
        )
    }

    /// Returns true if the caller cancelled or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LcscError::Cancelled { .. })
    }

    /// Returns the HTTP status behind this error, looking through retry exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            LcscError::RetryableStatus { status, .. } | LcscError::FatalStatus { status, .. } => {
                Some(*status)
            }
            LcscError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Returns the retry-after duration if the server supplied one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LcscError::RetryableStatus { retry_after, .. } => *retry_after,
            LcscError::RetriesExhausted { last, .. } => last.retry_after(),
            _ => None,
        }
    }

    /// Returns the underlying error of the final attempt for exhausted retries.
    pub fn last_error(&self) -> Option<&LcscError> {
        match self {
            LcscError::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Returns the underlying transport error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            LcscError::TransientTransport { source } | LcscError::FatalTransport { source } => {
                Some(source)
            }
            LcscError::RetriesExhausted { last, .. } => last.transport_error(),
            _ => None,
        }
    }

    /// Stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LcscError::Cancelled { .. } => "cancelled",
            LcscError::TransientTransport { .. } => "transient_transport",
            LcscError::FatalTransport { .. } => "fatal_transport",
            LcscError::RetryableStatus { .. } => "retryable_status",
            LcscError::FatalStatus { .. } => "fatal_status",
            LcscError::RetriesExhausted { .. } => "retries_exhausted",
            LcscError::MalformedResponse { .. } => "malformed_response",
            LcscError::Api { .. } => "api",
            LcscError::Configuration { .. } => "configuration",
            LcscError::Validation { .. } => "validation",
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(reason: CancelReason) -> Self {
        LcscError::Cancelled { reason }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        LcscError::Configuration {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        LcscError::Validation {
            message: message.into(),
        }
    }

    /// Creates a malformed response error, keeping the body if it is text.
    pub fn malformed(message: impl Into<String>, body: &[u8]) -> Self {
        LcscError::MalformedResponse {
            message: message.into(),
            body: std::str::from_utf8(body).ok().map(ToOwned::to_owned),
        }
    }
}

impl From<serde_json::Error> for LcscError {
    fn from(err: serde_json::Error) -> Self {
        LcscError::MalformedResponse {
            message: err.to_string(),
            body: None,
        }
    }
}
