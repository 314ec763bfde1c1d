//! The provisioning loop.
//!
//! [`Provisioner::run`] drives a solution's deployment steps strictly in
//! declared order: resolve parameters, render the step's calls, dispatch to
//! the registered step, persist its outputs, and halt on the first failure.
//! Each run owns its [`ParameterStore`]; observers only see events and
//! snapshots through the progress sink.
//!
//! [`Provisioner::start_provisioning`] adds a consent preflight and spawns the
//! run on the Tokio runtime, which is how shells invoke it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures_util::FutureExt;
use sb_api::scopes::{AZURE_DATA_EXPLORER_API_SCOPE, AZURE_MANAGEMENT_SCOPE, IOT_CENTRAL_API_SCOPE};
use sb_api::{HttpTransport, TokenProvider};
use sb_types::{
    ApiCall, ApiCallTemplate, DeploymentStepConfig, EngineSettings, ProvisioningState, RunReport, ServiceError,
    ServiceResponse, Solution, StartResult, StepOutputs,
};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::azure::{data_explorer_cluster_name, run_context};
use crate::executor::{ApiExecutor, NO_TOKEN_MESSAGE};
use crate::progress::{Progress, ProgressSink};
use crate::resolve::{ParameterStore, resolve_parameters};
use crate::steps::{StepContext, StepRegistry};
use crate::templates::{TemplateError, render_api_call, render_scope};

/// Message returned once a run has been spawned.
pub const STARTED_MESSAGE: &str = "Provisioning started";

/// Shared, read-only view of whether a run is executing.
#[derive(Debug, Clone, Default)]
pub struct ProvisioningStateHandle(Arc<AtomicBool>);

impl ProvisioningStateHandle {
    pub fn get(&self) -> ProvisioningState {
        if self.0.load(Ordering::SeqCst) {
            ProvisioningState::Active
        } else {
            ProvisioningState::Inactive
        }
    }

    fn set(&self, active: bool) {
        self.0.store(active, Ordering::SeqCst);
    }
}

/// Holds the state at `Active` until dropped, including during unwinding.
struct ActiveRun(ProvisioningStateHandle);

impl ActiveRun {
    fn enter(state: &ProvisioningStateHandle) -> Self {
        state.set(true);
        Self(state.clone())
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Runs solutions against the injected transport and token provider.
pub struct Provisioner {
    executor: ApiExecutor,
    registry: StepRegistry,
    settings: EngineSettings,
    sink: Arc<dyn ProgressSink>,
    state: ProvisioningStateHandle,
}

impl Provisioner {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenProvider>,
        settings: EngineSettings,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            executor: ApiExecutor::new(transport, tokens, &settings),
            registry: StepRegistry::with_builtin_steps(),
            settings,
            sink,
            state: ProvisioningStateHandle::default(),
        }
    }

    /// Replaces the step registry.
    pub fn with_registry(mut self, registry: StepRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Shares an existing state handle, so observers can watch runs.
    pub fn with_state_handle(mut self, state: ProvisioningStateHandle) -> Self {
        self.state = state;
        self
    }

    pub fn provisioning_state(&self) -> ProvisioningState {
        self.state.get()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Checks consent for every well-known scope, then spawns the run.
    ///
    /// The run is not started when any scope yields no token. The handle
    /// resolves to the solution with step outputs written back, and the
    /// run report.
    pub async fn start_provisioning(self: &Arc<Self>, solution: Solution) -> (StartResult, Option<JoinHandle<(Solution, RunReport)>>) {
        info!(solution = %solution.name, "start provisioning");

        for scope in consent_scopes(&solution) {
            if self.executor.tokens().scoped_token(&scope).await.is_none() {
                warn!(scope = %scope, "consent preflight could not obtain a token");
                let result = StartResult {
                    ok: false,
                    message: NO_TOKEN_MESSAGE.to_string(),
                };
                return (result, None);
            }
        }

        // The state reads Active from here until the spawned run ends.
        let active = ActiveRun::enter(&self.state);
        let provisioner = Arc::clone(self);
        let mut solution = solution;
        let handle = tokio::spawn(async move {
            let _active = active;
            let report = provisioner.run_steps(&mut solution).await;
            (solution, report)
        });

        let result = StartResult {
            ok: true,
            message: STARTED_MESSAGE.to_string(),
        };
        (result, Some(handle))
    }

    /// Executes every deployment step of `solution` in order.
    ///
    /// Each executed step's `outputs` are written back into `solution`.
    pub async fn run(&self, solution: &mut Solution) -> RunReport {
        let _active = ActiveRun::enter(&self.state);
        self.run_steps(solution).await
    }

    async fn run_steps(&self, solution: &mut Solution) -> RunReport {
        info!(solution = %solution.name, steps = solution.deployment_configs.len(), "starting provisioning loop");
        let mut parameters = ParameterStore::default();
        parameters.seed_context(run_context(solution, &self.settings));

        let progress = Progress::new(Arc::clone(&self.sink), self.settings.progress_pause());
        let mut report = RunReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            completed_steps: Vec::new(),
            failed_step: None,
            last_response: None,
        };
        self.sink.on_run_started();

        for config in solution.deployment_configs.iter_mut() {
            self.sink.on_step_started(&config.id);
            let step_progress = progress.for_step(&config.id);
            step_progress.show("Provisioning...", true).await;
            info!(step_id = %config.id, step = %config.name, "processing step");

            let outcome = AssertUnwindSafe(self.execute_deployment_step(config, &mut parameters, &step_progress))
                .catch_unwind()
                .await;
            let response = match outcome {
                Ok(response) => response,
                Err(panic) => {
                    let message = format!("Error during provisioning step - {}: {}", config.name, panic_message(panic.as_ref()));
                    error!(step_id = %config.id, "{message}");
                    ServiceResponse::internal_error(message)
                }
            };

            let outputs = StepOutputs {
                status: response.status,
                message: response.message.clone(),
                parameters: response
                    .succeeded()
                    .then(|| parameters.entry(&config.item_step).cloned().unwrap_or_default()),
            };
            self.sink.on_outputs_saved(&config.id, &outputs);
            config.outputs = outputs;

            step_progress.show("Provisioning step finished", true).await;
            self.sink.on_step_finished(&config.id);

            if !response.succeeded() {
                error!(step_id = %config.id, status = response.status, message = %response.message, "provisioning halted");
                self.sink.on_service_error(&ServiceError {
                    status: response.status,
                    title: config.item_step.clone(),
                    message: response.message.clone(),
                });
                report.failed_step = Some(config.id.clone());
                report.last_response = Some(response);
                break;
            }

            report.completed_steps.push(config.id.clone());
            report.last_response = Some(response);
        }

        report.finished_at = Utc::now();
        self.sink.on_run_completed(report.succeeded());
        info!(completed = report.completed_steps.len(), failed_step = report.failed_step.as_deref(), "leaving provisioning loop");
        report
    }

    async fn execute_deployment_step(
        &self,
        config: &DeploymentStepConfig,
        parameters: &mut ParameterStore,
        progress: &Progress,
    ) -> ServiceResponse {
        info!(step_type = %config.item_step, "executing deployment step");

        let resolved = resolve_parameters(&config.parameters, parameters);
        parameters.merge(&config.item_step, resolved.clone());

        let rendered = render_call(config.api.as_ref(), &resolved)
            .and_then(|api| Ok((api, render_call(config.lro_api.as_ref(), &resolved)?)));
        let (api, lro_api) = match rendered {
            Ok(calls) => calls,
            Err(error) => {
                warn!(step_id = %config.id, error = %error, "could not render api call");
                return ServiceResponse::internal_error(format!("Configuration error in step '{}': {error}", config.name));
            }
        };

        let step = self.registry.resolve(&config.item_step);
        let mut ctx = StepContext {
            executor: &self.executor,
            parameters,
            progress: progress.clone(),
            settings: &self.settings,
        };
        match step.run(config, &mut ctx, api, lro_api).await {
            Ok(response) => response,
            Err(error) => {
                let message = format!("Error during provisioning step - {}: {error:#}", config.name);
                error!(step_id = %config.id, "{message}");
                ServiceResponse::internal_error(message)
            }
        }
    }
}

fn render_call(template: Option<&ApiCallTemplate>, parameters: &Map<String, Value>) -> Result<Option<ApiCall>, TemplateError> {
    template
        .map(|template| render_api_call(&template.config, parameters))
        .transpose()
}

/// Scopes a run needs consent for: resource management, IoT Central, and the
/// solution's data-explorer cluster.
pub fn consent_scopes(solution: &Solution) -> Vec<String> {
    let cluster_parameters = Map::from_iter([
        ("clusterName".to_string(), Value::String(data_explorer_cluster_name(solution))),
        ("resourceLocation".to_string(), Value::String(solution.resource_location.clone())),
    ]);

    let mut scopes = vec![AZURE_MANAGEMENT_SCOPE.to_string(), IOT_CENTRAL_API_SCOPE.to_string()];
    match render_scope(AZURE_DATA_EXPLORER_API_SCOPE, &cluster_parameters) {
        Ok(scope) => scopes.push(scope),
        Err(error) => warn!(error = %error, "could not render data explorer scope"),
    }
    scopes
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_string()
    }
}
