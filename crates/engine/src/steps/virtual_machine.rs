use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;
use sb_types::{ApiCall, DeploymentStepConfig, ServiceResponse};
use serde_json::Value;
use tracing::warn;

use super::readiness::{Readiness, ReadinessWait, wait_until_ready};
use super::{DeploymentStep, StepContext, missing_call, with_scope};

const MAX_WAIT: Duration = Duration::from_secs(8 * 60);
const ESTIMATED_PROVISIONING: Duration = Duration::from_secs(250);
const ADMIN_PASSWORD_POINTER: &str = "/properties/parameters/adminPasswordOrKey";
const TIMEOUT_MESSAGE: &str = "Provisioning the Azure Virtual Machine with Azure IoT Edge runtime is taking longer than expected. There may be a problem with your subscription or access to Azure resources.";

/// Generates the throwaway administrator password of a new virtual machine:
/// a fixed complexity prefix followed by 16 hex digits from the OS RNG.
pub fn generate_admin_password() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::from("Ag2#"), |mut password, byte| {
        let _ = write!(password, "{byte:02x}");
        password
    })
}

/// Creates the edge-runtime virtual machine and waits for the runtime to report in.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateVirtualMachineStep;

#[async_trait]
impl DeploymentStep for CreateVirtualMachineStep {
    async fn run(
        &self,
        config: &DeploymentStepConfig,
        ctx: &mut StepContext<'_>,
        api: Option<ApiCall>,
        lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        ctx.show_progress("Creating Virtual Machine with Azure IoT Edge runtime...").await;

        let Some((mut call, scope)) = with_scope(api, config.api.as_ref()) else {
            return Ok(missing_call(config, "api"));
        };
        let Some((ready_call, ready_scope)) = with_scope(lro_api, config.lro_api.as_ref()) else {
            return Ok(missing_call(config, "lroApi"));
        };

        // The password only ever lives in this one request body.
        let Some(admin_password) = call
            .data
            .as_mut()
            .and_then(|data| data.pointer_mut(ADMIN_PASSWORD_POINTER))
            .and_then(Value::as_object_mut)
        else {
            return Ok(missing_call(config, "adminPasswordOrKey parameter in the api"));
        };
        admin_password.insert("value".to_string(), Value::String(generate_admin_password()));

        let mut response = ctx.execute(&call, scope).await;
        if !response.succeeded() {
            return Ok(response);
        }

        ctx.show_progress("Waiting for Azure IoT Edge runtime startup...").await;

        let wait = ReadinessWait {
            label: "virtual machine edge runtime",
            max_wait: MAX_WAIT,
            estimate: Some(ESTIMATED_PROVISIONING),
            progress_text: "Waiting for Azure IoT Edge runtime startup",
        };
        if let Readiness::TimedOut { elapsed } = wait_until_ready(ctx, &ready_call, ready_scope, wait).await {
            warn!(step_id = %config.id, elapsed_secs = elapsed.as_secs(), "edge runtime did not report in");
            response.status = 500;
            response.message = TIMEOUT_MESSAGE.to_string();
        }

        Ok(response)
    }
}
