//! HTTP transport layer for the LCSC client.
//!
//! The transport performs exactly one attempt per call. Non-2xx statuses come
//! back as ordinary [`HttpResponse`]s; only failures to obtain a response at
//! all are reported as [`TransportError`]. Deciding what to do with either is
//! left to the resilience layer.

mod http;

pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

/// Transport error types.
///
/// Variants are split along the transient/fatal boundary used by the retry
/// policy; see [`TransportError::is_transient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The attempt did not complete in time.
    #[error("Request timed out")]
    Timeout {
        /// Configured timeout, when known.
        timeout: Option<Duration>,
    },

    /// Connection refused, reset, aborted or closed before a response.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// The response body stream broke off after the headers arrived.
    #[error("Response body interrupted: {message}")]
    BodyInterrupted {
        /// Error message.
        message: String,
    },

    /// Host name resolution failed.
    #[error("DNS resolution failed: {message}")]
    Dns {
        /// Error message.
        message: String,
    },

    /// TLS handshake or certificate failure.
    #[error("TLS error: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// The request could not be built (bad URL, header or method).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error message.
        message: String,
    },

    /// Any other failure.
    #[error("Transport error: {message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Returns true if a fresh attempt could plausibly succeed.
    ///
    /// Timeouts and dropped connections are transient. DNS, TLS, malformed
    /// requests and unrecognised failures are fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. }
                | TransportError::Connection { .. }
                | TransportError::BodyInterrupted { .. }
        )
    }

    /// Maps a reqwest failure onto the transport taxonomy.
    pub fn from_reqwest(err: &reqwest::Error, timeout: Option<Duration>) -> Self {
        let message = error_chain(err);

        if err.is_timeout() {
            return TransportError::Timeout { timeout };
        }
        if err.is_builder() {
            return TransportError::InvalidRequest { message };
        }
        if let Some(kind) = io_error_kind(err) {
            if let Some(mapped) = classify_io_kind(kind, &message, timeout) {
                return mapped;
            }
        }

        let lower = message.to_ascii_lowercase();
        if looks_like_dns(&lower) {
            return TransportError::Dns { message };
        }
        if looks_like_tls(&lower) {
            return TransportError::Tls { message };
        }
        if err.is_connect() || lower.contains("connection closed") {
            return TransportError::Connection { message };
        }
        if err.is_body() {
            return TransportError::BodyInterrupted { message };
        }
        TransportError::Other { message }
    }
}

/// Classifies an I/O error kind. Returns `None` for kinds that carry no
/// transience signal, leaving the decision to the message heuristics.
pub(crate) fn classify_io_kind(
    kind: io::ErrorKind,
    message: &str,
    timeout: Option<Duration>,
) -> Option<TransportError> {
    match kind {
        io::ErrorKind::TimedOut => Some(TransportError::Timeout { timeout }),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => Some(TransportError::Connection {
            message: message.to_string(),
        }),
        io::ErrorKind::UnexpectedEof => Some(TransportError::BodyInterrupted {
            message: message.to_string(),
        }),
        _ => None,
    }
}

fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let part = e.to_string();
        if !message.contains(&part) {
            message.push_str(": ");
            message.push_str(&part);
        }
        current = e.source();
    }
    message
}

fn looks_like_dns(lower: &str) -> bool {
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
}

fn looks_like_tls(lower: &str) -> bool {
    lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl")
}
