//! Deployment step implementations and the registry that selects them.
//!
//! A step receives its config, a [`StepContext`] giving access to the API
//! executor, the run's parameter store and the progress reporter, and the
//! already rendered primary and LRO calls. Step-type identifiers without a
//! registered implementation run the [`GenericStep`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sb_types::{ApiCall, ApiCallTemplate, DeploymentStepConfig, EngineSettings, ServiceResponse};
use tracing::{debug, warn};

use crate::executor::ApiExecutor;
use crate::progress::Progress;
use crate::resolve::ParameterStore;

mod adx_streaming;
mod arc_server;
mod device_attestation;
mod generic;
mod iot_central;
pub mod readiness;
mod virtual_machine;

pub use adx_streaming::{EnableAdxStreamingPolicyStep, data_explorer_headers};
pub use arc_server::DeployEdgeToArcServerStep;
pub use device_attestation::GetOpcDeviceAttestationStep;
pub use generic::GenericStep;
pub use iot_central::CreateIotCentralAppStep;
pub use virtual_machine::{CreateVirtualMachineStep, generate_admin_password};

/// Everything a step may touch while it runs.
pub struct StepContext<'a> {
    pub executor: &'a ApiExecutor,
    pub parameters: &'a mut ParameterStore,
    pub progress: Progress,
    pub settings: &'a EngineSettings,
}

impl StepContext<'_> {
    /// Executes `call` with a token for `scope`, reporting through this step's progress.
    pub async fn execute(&self, call: &ApiCall, scope: &str) -> ServiceResponse {
        self.executor.execute(call, scope, &self.progress).await
    }

    pub async fn show_progress(&self, message: &str) {
        self.progress.show(message, true).await;
    }
}

/// A deployment step implementation.
#[async_trait]
pub trait DeploymentStep: Send + Sync {
    /// Runs the step. Returned errors are unexpected failures that the
    /// provisioning loop turns into a failed step.
    async fn run(
        &self,
        config: &DeploymentStepConfig,
        ctx: &mut StepContext<'_>,
        api: Option<ApiCall>,
        lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse>;
}

/// Static mapping from step-type identifier to implementation.
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn DeploymentStep>>,
    fallback: Arc<dyn DeploymentStep>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_builtin_steps()
    }
}

impl StepRegistry {
    /// Registry holding only the generic fallback.
    pub fn empty() -> Self {
        Self {
            steps: HashMap::new(),
            fallback: Arc::new(GenericStep),
        }
    }

    pub fn with_builtin_steps() -> Self {
        Self::empty()
            .register("createIotCentralApp", CreateIotCentralAppStep)
            .register("createVirtualMachine", CreateVirtualMachineStep)
            .register("deployEdgeToArcServer", DeployEdgeToArcServerStep)
            .register("enableAdxStreamingPolicy", EnableAdxStreamingPolicyStep)
            .register("getOpcDeviceAttestation", GetOpcDeviceAttestationStep)
    }

    pub fn register(mut self, step_type: impl Into<String>, step: impl DeploymentStep + 'static) -> Self {
        self.steps.insert(step_type.into(), Arc::new(step));
        self
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.steps.contains_key(step_type)
    }

    /// Returns the implementation for `step_type`, falling back to the generic step.
    pub fn resolve(&self, step_type: &str) -> Arc<dyn DeploymentStep> {
        match self.steps.get(step_type) {
            Some(step) => {
                debug!(step_type, "resolved deployment step");
                Arc::clone(step)
            }
            None => {
                debug!(step_type, "no deployment step registered, using generic step");
                Arc::clone(&self.fallback)
            }
        }
    }
}

/// Configuration error for a step that needs a template it does not declare.
pub(crate) fn missing_call(config: &DeploymentStepConfig, which: &str) -> ServiceResponse {
    let message = format!("Configuration error in step '{}': no {which} call is configured", config.name);
    warn!(step_id = %config.id, step_type = %config.item_step, "{message}");
    ServiceResponse::internal_error(message)
}

/// Pairs a rendered call with the auth scope of its template.
pub(crate) fn with_scope<'a>(call: Option<ApiCall>, template: Option<&'a ApiCallTemplate>) -> Option<(ApiCall, &'a str)> {
    Some((call?, template?.api_auth_scope.as_str()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use sb_types::{ApiCallTemplate, DeploymentStepConfig, EngineSettings, StepOutputs};
    use serde_json::{Map, Value};

    use super::StepContext;
    use crate::executor::ApiExecutor;
    use crate::progress::{Progress, ProgressSink};
    use crate::resolve::ParameterStore;

    pub(crate) fn step_config(item_step: &str, api_scope: Option<&str>, lro_scope: Option<&str>) -> DeploymentStepConfig {
        let template = |scope: &str| ApiCallTemplate {
            api_auth_scope: scope.to_string(),
            config: Value::Null,
        };
        DeploymentStepConfig {
            id: format!("{item_step}-id"),
            name: format!("Run {item_step}"),
            description: String::new(),
            item_type: None,
            item_step: item_step.to_string(),
            doc_link: String::new(),
            parameters: Map::new(),
            api: api_scope.map(template),
            lro_api: lro_scope.map(template),
            outputs: StepOutputs::default(),
        }
    }

    pub(crate) fn context<'a>(
        executor: &'a ApiExecutor,
        parameters: &'a mut ParameterStore,
        settings: &'a EngineSettings,
        sink: Arc<dyn ProgressSink>,
    ) -> StepContext<'a> {
        StepContext {
            executor,
            parameters,
            progress: Progress::new(sink, Duration::ZERO),
            settings,
        }
    }
}
