//! Normalized results of remote calls.
//!
//! [`ServiceResponse`] is the single currency exchanged between the API
//! executor, the long-running-operation poller, deployment steps, and the
//! provisioning loop. Every layer converts its own failures into one of these
//! instead of propagating errors across component boundaries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header map captured from a provider reply. Keys are lower-cased.
pub type ResponseHeaders = IndexMap<String, String>;

/// Normalized result of any remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// Numeric HTTP-like status code.
    pub status: u16,
    /// Human readable message.
    pub message: String,
    /// Optional JSON payload returned by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Optional raw headers, used to detect asynchronous operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<ResponseHeaders>,
}

impl ServiceResponse {
    /// Creates a bare response with the given status and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            payload: None,
            headers: None,
        }
    }

    /// Empty `200` response used as the starting point of step implementations.
    pub fn ok() -> Self {
        Self::new(200, "")
    }

    /// Builds a `500` response wrapping the supplied message.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    /// Returns true when `200 <= status <= 299`.
    pub fn succeeded(&self) -> bool {
        service_response_succeeded(self)
    }

    /// Returns the `status` field of a JSON payload, if present.
    pub fn payload_status(&self) -> Option<&str> {
        self.payload.as_ref()?.get("status")?.as_str()
    }
}

impl Default for ServiceResponse {
    fn default() -> Self {
        Self::ok()
    }
}

/// Success predicate shared by every component.
pub fn service_response_succeeded(response: &ServiceResponse) -> bool {
    (200..=299).contains(&response.status)
}

/// Structured failure surfaced to observers when a run halts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    pub status: u16,
    /// Step-type identifier of the failing step.
    pub title: String,
    pub message: String,
}
