use async_trait::async_trait;
use sb_types::{ApiCall, DeploymentStepConfig, ServiceResponse};

use super::{DeploymentStep, StepContext, missing_call, with_scope};

/// Executes the primary call and returns its result unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericStep;

#[async_trait]
impl DeploymentStep for GenericStep {
    async fn run(
        &self,
        config: &DeploymentStepConfig,
        ctx: &mut StepContext<'_>,
        api: Option<ApiCall>,
        _lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        ctx.show_progress(&config.name).await;

        let Some((call, scope)) = with_scope(api, config.api.as_ref()) else {
            return Ok(missing_call(config, "api"));
        };
        Ok(ctx.execute(&call, scope).await)
    }
}
