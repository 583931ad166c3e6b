//! Mock implementations for testing.
//!
//! [`MockTransport`] replays scripted outcomes in order, falls back to a
//! default once the script runs out, and records every request it receives.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// A scripted transport outcome.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Response or transport failure to return.
    pub outcome: Result<HttpResponse, TransportError>,
    /// Simulated latency before returning.
    pub delay: Option<Duration>,
}

impl MockResponse {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            outcome: Ok(HttpResponse::new(200, body)),
            delay: None,
        }
    }

    /// A response with the given status and an empty body.
    pub fn status(status: u16) -> Self {
        Self {
            outcome: Ok(HttpResponse::new(status, Bytes::new())),
            delay: None,
        }
    }

    /// A 200 JSON response.
    pub fn json<T: Serialize>(value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::ok(body).with_header("content-type", "application/json")
    }

    /// A 200 response wrapping `result` in the API envelope with code 200.
    pub fn envelope<T: Serialize>(result: &T) -> Self {
        Self::json(&serde_json::json!({ "code": 200, "msg": "", "result": result }))
    }

    /// A 200 response whose envelope carries an error code.
    pub fn api_error(code: i64, msg: &str) -> Self {
        Self::json(&serde_json::json!({ "code": code, "msg": msg, "result": null }))
    }

    /// A transport failure.
    pub fn error(error: TransportError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
        }
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        if let Ok(response) = &mut self.outcome {
            response.body = body.into();
        }
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Ok(response) = &mut self.outcome {
            response
                .headers
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
        self
    }

    /// Delays the outcome.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Mock HTTP transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    default_response: Mutex<Option<MockResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response used once the queue is empty.
    #[must_use]
    pub fn with_default(self, response: MockResponse) -> Self {
        self.set_default(response);
        self
    }

    /// Queues a response.
    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    /// Sets the response used once the queue is empty.
    pub fn set_default(&self, response: MockResponse) {
        *self.default_response.lock() = Some(response);
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self) -> MockResponse {
        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        self.default_response
            .lock()
            .clone()
            .unwrap_or_else(|| {
                MockResponse::error(TransportError::Other {
                    message: "no mock response queued".to_string(),
                })
            })
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        let response = self.next_response();
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        response.outcome
    }
}
