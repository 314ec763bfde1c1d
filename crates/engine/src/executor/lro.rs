//! Long-running operation polling for resource-management calls.
//!
//! The resource-management API acknowledges mutating calls immediately and
//! reports completion through an operation-status endpoint advertised in the
//! `azure-asyncoperation` (or `location`) header. This module polls that
//! endpoint until the provider reports a terminal state.
//!
//! There is no iteration cap here; the enclosing step's wall-clock limits are
//! the outer bound.

use std::time::Duration;

use sb_api::scopes::AZURE_MANAGEMENT_SCOPE;
use sb_types::{ApiCall, ResponseHeaders, ServiceResponse};
use tracing::{error, info};

use super::{ApiExecutor, NO_TOKEN_MESSAGE, with_bearer};
use crate::progress::Progress;

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";
const RETRY_AFTER_HEADER: &str = "retry-after";

const STATUS_ACCEPTED: &str = "Accepted";
const STATUS_RUNNING: &str = "Running";
const STATUS_SUCCEEDED: &str = "Succeeded";

/// Where and how often to poll an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTracking {
    pub url: String,
    pub retry_after: Duration,
}

/// Extracts the tracking URL and retry interval from primary-call headers.
///
/// Returns `None` when the provider completed the call synchronously.
pub fn operation_tracking(headers: Option<&ResponseHeaders>, default_retry_after: Duration) -> Option<OperationTracking> {
    let headers = headers?;
    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    };

    let url = header(ASYNC_OPERATION_HEADER).or_else(|| header(LOCATION_HEADER))?;
    let retry_after = header(RETRY_AFTER_HEADER)
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default_retry_after);

    Some(OperationTracking {
        url: url.to_string(),
        retry_after,
    })
}

fn is_polling_status(status: u16) -> bool {
    status == 200 || status == 202
}

impl ApiExecutor {
    /// Waits for the operation advertised by `headers` to reach a terminal state.
    ///
    /// Returns an empty success when no operation was advertised. Otherwise the
    /// final provider status becomes the message, and anything other than
    /// `Succeeded` is reported as status 500.
    pub async fn wait_for_operation(&self, headers: Option<&ResponseHeaders>, progress: &Progress) -> ServiceResponse {
        info!("waiting for operation status");

        let Some(tracking) = operation_tracking(headers, self.default_retry_after) else {
            // Completed synchronously.
            return ServiceResponse::ok();
        };

        let mut response;
        loop {
            // Tokens may expire during long waits; fetch a fresh one per poll.
            let Some(token) = self.tokens.scoped_token(AZURE_MANAGEMENT_SCOPE).await else {
                error!(url = %tracking.url, "{NO_TOKEN_MESSAGE} while polling");
                return ServiceResponse::new(401, NO_TOKEN_MESSAGE);
            };
            response = self.request(&with_bearer(&ApiCall::get(tracking.url.clone()), &token)).await;

            let operation_status = response.payload_status().map(str::to_string);
            info!(
                code = response.status,
                status = operation_status.as_deref().unwrap_or("unknown"),
                "operation status"
            );

            if operation_status.as_deref() == Some(STATUS_ACCEPTED) {
                tokio::time::sleep(tracking.retry_after).await;
                if is_polling_status(response.status) {
                    continue;
                }
                break;
            }

            if !is_polling_status(response.status) || operation_status.as_deref() != Some(STATUS_RUNNING) {
                break;
            }

            progress
                .show(&format!("Resource deployment status: {STATUS_RUNNING}"), true)
                .await;
            tokio::time::sleep(tracking.retry_after).await;
        }

        response.message = match response.payload_status() {
            Some(status) => status.to_string(),
            None if response.succeeded() => STATUS_SUCCEEDED.to_string(),
            None => std::mem::take(&mut response.message),
        };
        if response.message != STATUS_SUCCEEDED {
            response.status = 500;
        }
        response
    }
}
