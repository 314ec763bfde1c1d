use async_trait::async_trait;
use sb_types::{ApiCall, DeploymentStepConfig, ServiceResponse};
use serde_json::Value;

use super::{DeploymentStep, StepContext, missing_call, with_scope};

/// Reads the edge gateway's attestation so later steps can provision it.
///
/// Stores `scopeId` (the app's ID scope) and `symmetricKey` in the step's
/// parameter entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOpcDeviceAttestationStep;

#[async_trait]
impl DeploymentStep for GetOpcDeviceAttestationStep {
    async fn run(
        &self,
        config: &DeploymentStepConfig,
        ctx: &mut StepContext<'_>,
        api: Option<ApiCall>,
        _lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        ctx.show_progress("Retrieving edge gateway device attestation properties...").await;

        let Some((call, scope)) = with_scope(api, config.api.as_ref()) else {
            return Ok(missing_call(config, "api"));
        };

        let response = ctx.execute(&call, scope).await;
        if response.succeeded() {
            let field = |name: &str| {
                response
                    .payload
                    .as_ref()
                    .and_then(|payload| payload.get(name))
                    .cloned()
                    .unwrap_or(Value::Null)
            };
            ctx.parameters.set(&config.item_step, "scopeId", field("idScope"));
            ctx.parameters.set(&config.item_step, "symmetricKey", field("symmetricKey"));
        }

        Ok(response)
    }
}
