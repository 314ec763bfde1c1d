//! Remote collaborators consumed by the provisioning engine.
//!
//! The engine never talks to a concrete HTTP client or identity library
//! directly. It consumes two capabilities:
//!
//! - [`HttpTransport`]: issues one request per [`ApiCall`] and returns the raw
//!   status, headers and body, or a [`TransportError`] when no reply arrived
//! - [`TokenProvider`]: hands out bearer tokens for an auth scope
//!
//! [`ReqwestTransport`] is the production transport. Token providers live in
//! [`token`], and the well-known scopes in [`scopes`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, Method, Url, header};
use sb_types::{ApiCall, ResponseHeaders};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub mod scopes;
pub mod token;

pub use token::{AzureCliTokenProvider, StaticTokenProvider, TokenProvider};

/// Hostnames allowed to use plain HTTP, for local emulators and tests.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Raw reply from the remote side. Any HTTP status is a reply, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    /// Canonical reason phrase, empty when unknown.
    pub status_text: String,
    /// Lower-cased header names.
    pub headers: ResponseHeaders,
    /// JSON body when it parsed, the raw text otherwise, `None` when empty.
    pub body: Option<Value>,
}

/// Failure to obtain any reply at all.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

/// Issues HTTP requests described by an [`ApiCall`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, call: &ApiCall) -> Result<HttpReply, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    user_agent: String,
}

impl ReqwestTransport {
    /// Builds a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(|error| anyhow::anyhow!("build http client: {error}"))?;

        Ok(Self {
            http,
            user_agent: format!("solution-builder/0.1; {}", std::env::consts::OS),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, call: &ApiCall) -> Result<HttpReply, TransportError> {
        let method = Method::from_str(&call.method.to_ascii_uppercase())
            .map_err(|error| TransportError::InvalidRequest(format!("method '{}': {error}", call.method)))?;
        let url = validate_request_url(&call.url)?;
        debug!(%method, %url, header_count = call.headers.len(), "sending request");

        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(header::USER_AGENT, &self.user_agent);
        for (name, value) in &call.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(data) = call.data.as_ref()
            && method != Method::GET
        {
            builder = builder.json(data);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        let text = response.text().await.map_err(classify_reqwest_error)?;

        Ok(HttpReply {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: parse_body(&text),
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

fn collect_headers(headers: &header::HeaderMap) -> ResponseHeaders {
    let mut collected = IndexMap::new();
    for (name, value) in headers {
        if let Ok(text) = value.to_str() {
            collected.insert(name.as_str().to_ascii_lowercase(), text.to_string());
        }
    }
    collected
}

/// Parses a reply body: JSON when possible, raw text otherwise.
pub fn parse_body(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// Validates a request URL.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
pub fn validate_request_url(raw: &str) -> Result<Url, TransportError> {
    let parsed = Url::parse(raw).map_err(|error| TransportError::InvalidRequest(format!("url '{raw}': {error}")))?;
    let host_name = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidRequest(format!("url '{raw}' must include a host")))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(parsed);
    }

    if parsed.scheme() != "https" {
        return Err(TransportError::InvalidRequest(format!(
            "url '{raw}' must use https for non-localhost hosts; got '{}://'",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}
