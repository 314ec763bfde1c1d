//! API executor: token acquisition, request dispatch and response normalization.
//!
//! - `execute` acquires a bearer token for the call's auth scope, attaches it,
//!   and issues the call through the injected [`HttpTransport`]
//! - calls made with the resource-management scope continue into the
//!   long-running-operation flow in [`lro`]
//! - every outcome, including transport faults, is normalized into a
//!   [`ServiceResponse`]; nothing escapes as an error

use std::sync::Arc;
use std::time::Duration;

use sb_api::{HttpReply, HttpTransport, TokenProvider, scopes::is_resource_management_scope};
use sb_types::{ApiCall, EngineSettings, ServiceResponse};
use serde_json::Value;
use sb_util::redact_sensitive;
use tracing::{debug, error, info, warn};

use crate::progress::Progress;

pub mod lro;

/// Message returned when no token could be obtained for a scope.
pub const NO_TOKEN_MESSAGE: &str = "Could not retrieve a valid authentication token";

/// Executes rendered API calls on behalf of deployment steps.
pub struct ApiExecutor {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenProvider>,
    default_retry_after: Duration,
}

impl ApiExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<dyn TokenProvider>, settings: &EngineSettings) -> Self {
        Self {
            transport,
            tokens,
            default_retry_after: settings.default_retry_after(),
        }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Executes `call` with a token for `auth_scope`.
    ///
    /// Resource-management calls are followed through their long-running
    /// operation before returning.
    pub async fn execute(&self, call: &ApiCall, auth_scope: &str, progress: &Progress) -> ServiceResponse {
        let Some(token) = self.tokens.scoped_token(auth_scope).await else {
            error!(scope = auth_scope, "{NO_TOKEN_MESSAGE}");
            return ServiceResponse::new(401, NO_TOKEN_MESSAGE);
        };

        let authorized = with_bearer(call, &token);
        if is_resource_management_scope(auth_scope) {
            self.execute_resource_management(&authorized, progress).await
        } else {
            self.request(&authorized).await
        }
    }

    async fn execute_resource_management(&self, call: &ApiCall, progress: &Progress) -> ServiceResponse {
        let mut main_response = self.request(call).await;
        if !main_response.succeeded() {
            error!(status = main_response.status, message = %main_response.message, "resource request failed");
            return main_response;
        }

        info!("request succeeded - checking for long running operation status");

        let operation_response = self.wait_for_operation(main_response.headers.as_ref(), progress).await;
        if !operation_response.succeeded() {
            warn!(
                status = operation_response.status,
                message = %operation_response.message,
                "long running operation returned an error"
            );
            main_response.status = operation_response.status;
            main_response.message = operation_response.message;
        }

        main_response
    }

    /// Issues a single request and normalizes the outcome.
    pub async fn request(&self, call: &ApiCall) -> ServiceResponse {
        info!(method = %call.method, url = %call.url, "issuing api request");
        debug!(headers = %redact_sensitive(&format!("{:?}", call.headers)), "api request headers");

        match self.transport.send(call).await {
            Ok(reply) => {
                let response = normalize_reply(reply);
                if response.succeeded() {
                    info!(status = response.status, "api request completed");
                } else {
                    warn!(status = response.status, message = %response.message, "api request returned a fault");
                }
                response
            }
            Err(transport_error) => {
                warn!(error = %transport_error, "api request failed in transport");
                ServiceResponse::internal_error(format!("An error occurred during the request: {transport_error}"))
            }
        }
    }
}

/// Copies `call` with an `Authorization: Bearer` header, replacing any existing one.
pub fn with_bearer(call: &ApiCall, token: &str) -> ApiCall {
    let mut authorized = call.clone();
    authorized.headers.retain(|name, _| !name.eq_ignore_ascii_case("authorization"));
    authorized
        .headers
        .insert("Authorization".to_string(), format!("Bearer {token}"));
    authorized
}

/// Normalizes a transport reply. Non-2xx replies are API faults whose message
/// comes from the provider's error body when one is present.
pub fn normalize_reply(reply: HttpReply) -> ServiceResponse {
    if (200..=299).contains(&reply.status) {
        let message = if reply.status_text.is_empty() {
            reply.status.to_string()
        } else {
            reply.status_text
        };
        return ServiceResponse {
            status: reply.status,
            message,
            payload: reply.body,
            headers: Some(reply.headers),
        };
    }

    let message = reply
        .body
        .as_ref()
        .and_then(provider_error_message)
        .unwrap_or_else(|| format!("An error occurred during the request: {}", reply.status));
    ServiceResponse::new(reply.status, message)
}

/// Extracts `error.message` from a provider error body.
pub fn provider_error_message(body: &Value) -> Option<String> {
    body.get("error")?
        .get("message")?
        .as_str()
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
