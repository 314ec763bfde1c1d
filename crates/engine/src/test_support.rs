//! In-memory collaborators shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sb_api::{HttpReply, HttpTransport, StaticTokenProvider, TokenProvider, TransportError};
use sb_types::{ApiCall, ResponseHeaders};
use serde_json::Value;

/// Transport that replays a fixed script and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    requests: Mutex<Vec<ApiCall>>,
}

impl ScriptedTransport {
    pub(crate) fn with_reply(self, reply: HttpReply) -> Self {
        self.script.lock().expect("script lock").push_back(Ok(reply));
        self
    }

    pub(crate) fn with_error(self, error: TransportError) -> Self {
        self.script.lock().expect("script lock").push_back(Err(error));
        self
    }

    pub(crate) fn requests(&self) -> Vec<ApiCall> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, call: &ApiCall) -> Result<HttpReply, TransportError> {
        self.requests.lock().expect("requests lock").push(call.clone());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network(format!("no scripted reply for {}", call.url))))
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "",
    }
}

pub(crate) fn reply(status: u16, body: Value) -> HttpReply {
    HttpReply {
        status,
        status_text: status_text(status).to_string(),
        headers: ResponseHeaders::new(),
        body: Some(body),
    }
}

pub(crate) fn reply_with_headers(status: u16, body: Value, headers: &[(&str, &str)]) -> HttpReply {
    let mut scripted = reply(status, body);
    scripted.headers = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
        .collect();
    scripted
}

/// Token provider that grants `token-123` for every scope.
pub(crate) fn tokens() -> Arc<dyn TokenProvider> {
    Arc::new(StaticTokenProvider::new(Some("token-123".to_string())))
}

/// Grants `token-123` a limited number of times, counting every request.
pub(crate) struct RationedTokens {
    remaining: Mutex<usize>,
    requested: Mutex<Vec<String>>,
}

impl RationedTokens {
    pub(crate) fn new(grants: usize) -> Self {
        Self {
            remaining: Mutex::new(grants),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requested_scopes(&self) -> Vec<String> {
        self.requested.lock().expect("requested lock").clone()
    }
}

#[async_trait]
impl TokenProvider for RationedTokens {
    async fn scoped_token(&self, scope: &str) -> Option<String> {
        self.requested.lock().expect("requested lock").push(scope.to_string());
        let mut remaining = self.remaining.lock().expect("remaining lock");
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some("token-123".to_string())
    }
}
