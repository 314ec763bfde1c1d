use async_trait::async_trait;
use indexmap::IndexMap;
use sb_types::{ApiCall, DeploymentStepConfig, ServiceResponse};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use super::{DeploymentStep, StepContext, missing_call, with_scope};
use crate::templates::render_scope;

const CLUSTER_NAME_PATH: &str = "createAdxCluster.clusterName";
const RESOURCE_LOCATION_PATH: &str = "context.resourceLocation";
const RESOURCE_NAME_SUFFIX_PATH: &str = "context.resourceNameSuffix";

/// Request headers expected by the data-explorer management endpoint.
pub fn data_explorer_headers(cluster_name: &str, resource_location: &str, resource_name_suffix: &str) -> IndexMap<String, String> {
    IndexMap::from([
        ("x-ms-client-request-id".to_string(), Uuid::new_v4().to_string()),
        ("x-ms-app".to_string(), resource_name_suffix.to_string()),
        ("x-ms-user-id".to_string(), resource_name_suffix.to_string()),
        ("Content-Type".to_string(), "application/json; charset=utf-8".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
        (
            "Host".to_string(),
            format!("{cluster_name}.{resource_location}.kusto.windows.net"),
        ),
    ])
}

/// Turns on streaming ingestion for the raw OPC data table.
///
/// The auth scope names the cluster host, so it is rendered here from the
/// cluster created by an earlier step.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnableAdxStreamingPolicyStep;

#[async_trait]
impl DeploymentStep for EnableAdxStreamingPolicyStep {
    async fn run(
        &self,
        config: &DeploymentStepConfig,
        ctx: &mut StepContext<'_>,
        api: Option<ApiCall>,
        _lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        ctx.show_progress("Enable streaming ingestion policy for raw opc data table...").await;

        let Some((mut call, scope_template)) = with_scope(api, config.api.as_ref()) else {
            return Ok(missing_call(config, "api"));
        };

        let text = |path: &str| ctx.parameters.lookup_str(path).unwrap_or_default().to_string();
        let cluster_name = text(CLUSTER_NAME_PATH);
        let resource_location = text(RESOURCE_LOCATION_PATH);
        let resource_name_suffix = text(RESOURCE_NAME_SUFFIX_PATH);
        if cluster_name.is_empty() {
            warn!(step_id = %config.id, path = CLUSTER_NAME_PATH, "data explorer cluster name is not available");
        }

        let scope_parameters = Map::from_iter([
            ("clusterName".to_string(), Value::String(cluster_name.clone())),
            ("resourceLocation".to_string(), Value::String(resource_location.clone())),
        ]);
        let scope = match render_scope(scope_template, &scope_parameters) {
            Ok(scope) => scope,
            Err(error) => {
                warn!(step_id = %config.id, error = %error, "could not render auth scope");
                return Ok(ServiceResponse::internal_error(format!(
                    "Configuration error in step '{}': {error}",
                    config.name
                )));
            }
        };

        call.headers = data_explorer_headers(&cluster_name, &resource_location, &resource_name_suffix);

        Ok(ctx.execute(&call, &scope).await)
    }
}
