use std::time::Duration;

use async_trait::async_trait;
use sb_types::{ApiCall, DeploymentStepConfig, ServiceResponse};
use serde_json::{Value, json};
use tracing::warn;

use super::readiness::{Readiness, ReadinessWait, wait_until_ready};
use super::{DeploymentStep, StepContext, missing_call, with_scope};

const MAX_WAIT: Duration = Duration::from_secs(5 * 60);
const TIMEOUT_MESSAGE: &str = "Provisioning the Azure IoT Central app is taking longer than expected. You can try to provision the remaining steps manually. See the README for help with this.";

/// Creates the IoT Central application and waits until its instance answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateIotCentralAppStep;

#[async_trait]
impl DeploymentStep for CreateIotCentralAppStep {
    async fn run(
        &self,
        config: &DeploymentStepConfig,
        ctx: &mut StepContext<'_>,
        api: Option<ApiCall>,
        lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        ctx.show_progress("Creating IoT Central app...").await;

        let Some((call, scope)) = with_scope(api, config.api.as_ref()) else {
            return Ok(missing_call(config, "api"));
        };
        let Some((ready_call, ready_scope)) = with_scope(lro_api, config.lro_api.as_ref()) else {
            return Ok(missing_call(config, "lroApi"));
        };

        let mut response = ctx.execute(&call, scope).await;
        if !response.succeeded() {
            return Ok(response);
        }

        if let Some(payload) = response.payload.as_ref() {
            store_app_identity(ctx, &config.item_step, payload);
        }

        ctx.show_progress("Waiting for app instance...").await;

        let wait = ReadinessWait {
            label: "IoT Central app",
            max_wait: MAX_WAIT,
            estimate: None,
            progress_text: "Waiting for app instance",
        };
        if let Readiness::TimedOut { elapsed } = wait_until_ready(ctx, &ready_call, ready_scope, wait).await {
            warn!(step_id = %config.id, elapsed_secs = elapsed.as_secs(), "IoT Central app did not become ready");
            response.status = 500;
            response.message = TIMEOUT_MESSAGE.to_string();
        }

        Ok(response)
    }
}

fn store_app_identity(ctx: &mut StepContext<'_>, step_type: &str, payload: &Value) {
    let field = |pointer: &str| payload.pointer(pointer).cloned().unwrap_or(Value::Null);

    ctx.parameters.set(step_type, "applicationId", field("/properties/applicationId"));
    ctx.parameters.set(step_type, "displayName", field("/properties/displayName"));
    ctx.parameters.set(
        step_type,
        "identity",
        json!({
            "type": field("/identity/type"),
            "tenantId": field("/identity/tenantId"),
            "principalId": field("/identity/principalId"),
        }),
    );
}
