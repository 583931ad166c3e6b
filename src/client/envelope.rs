//! The `{code, msg, result}` wrapper every LCSC response uses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{LcscError, LcscResult};

/// Envelope code signalling success.
pub const SUCCESS_CODE: i64 = 200;

/// Common response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T = serde_json::Value> {
    /// Application status code; 200 on success.
    pub code: i64,
    /// Human readable status message.
    #[serde(default, rename = "msg")]
    pub message: String,
    /// Payload, absent or null on failure.
    pub result: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Returns true if the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// Decodes an envelope and its payload.
///
/// A body that is not an envelope, or whose payload does not match `T`, is a
/// [`LcscError::MalformedResponse`]. A non-200 code becomes
/// [`LcscError::Api`]. An absent payload decodes as JSON `null`, so `T`
/// should be an `Option` when the endpoint may omit it.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> LcscResult<T> {
    let envelope: ApiEnvelope = serde_json::from_slice(body)
        .map_err(|e| LcscError::malformed(format!("failed to parse response: {e}"), body))?;

    if !envelope.is_success() {
        return Err(LcscError::Api {
            code: envelope.code,
            message: envelope.message,
        });
    }

    let result = envelope.result.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(result)
        .map_err(|e| LcscError::malformed(format!("failed to parse result: {e}"), body))
}
