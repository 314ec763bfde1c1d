use std::time::Duration;

use async_trait::async_trait;
use sb_types::{ApiCall, DeploymentStepConfig, ServiceResponse};
use tracing::warn;

use super::readiness::{Readiness, ReadinessWait, wait_until_ready};
use super::{DeploymentStep, StepContext, missing_call, with_scope};

const MAX_WAIT: Duration = Duration::from_secs(60 * 60);
const ESTIMATED_PROVISIONING: Duration = Duration::from_secs(250);
pub(crate) const TEMPLATE_FAILURE_MESSAGE: &str = "An error occurred trying to execute the Azure ARM template on the Arc enabled server. Please check the configuration for this step and examine the deployment logs for the specified resource group.";
const TIMEOUT_MESSAGE: &str = "Deploying Azure IoT Edge runtime on the Arc enabled server is taking longer than expected. There may be a problem with your subscription or access to Azure resources.";

/// Deploys the edge runtime to an Arc enabled server through an ARM template.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployEdgeToArcServerStep;

#[async_trait]
impl DeploymentStep for DeployEdgeToArcServerStep {
    async fn run(
        &self,
        config: &DeploymentStepConfig,
        ctx: &mut StepContext<'_>,
        api: Option<ApiCall>,
        lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        ctx.show_progress("Deploying Azure IoT Edge runtime to Arc enabled server...").await;

        let Some((call, scope)) = with_scope(api, config.api.as_ref()) else {
            return Ok(missing_call(config, "api"));
        };
        let Some((ready_call, ready_scope)) = with_scope(lro_api, config.lro_api.as_ref()) else {
            return Ok(missing_call(config, "lroApi"));
        };

        let mut response = ctx.execute(&call, scope).await;
        if !response.succeeded() {
            warn!(step_id = %config.id, status = response.status, cause = %response.message, "arc server template deployment failed");
            response.message = TEMPLATE_FAILURE_MESSAGE.to_string();
            return Ok(response);
        }

        ctx.show_progress("Waiting for Azure IoT Edge runtime startup...").await;

        let wait = ReadinessWait {
            label: "arc server edge runtime",
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
