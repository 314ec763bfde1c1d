use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sb_api::{HttpReply, HttpTransport, StaticTokenProvider, TransportError};
use sb_engine::{DeploymentStep, ProgressSink, Provisioner, ProvisioningStateHandle, StepContext, StepRegistry};
use sb_types::{
    ApiCall, DeploymentStepConfig, EngineSettings, ProvisioningEvent, ProvisioningState, ResponseHeaders, ServiceResponse,
    Solution,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// Replies by URL fragment; every request is recorded.
#[derive(Default)]
struct RoutedTransport {
    routes: Mutex<Vec<(String, VecDeque<HttpReply>)>>,
    requests: Mutex<Vec<ApiCall>>,
}

impl RoutedTransport {
    fn route(self, url_fragment: &str, reply: HttpReply) -> Self {
        {
            let mut routes = self.routes.lock().expect("routes lock");
            match routes.iter_mut().find(|(fragment, _)| fragment == url_fragment) {
                Some((_, replies)) => replies.push_back(reply),
                None => routes.push((url_fragment.to_string(), VecDeque::from([reply]))),
            }
        }
        self
    }

    fn requests(&self) -> Vec<ApiCall> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpTransport for RoutedTransport {
    async fn send(&self, call: &ApiCall) -> Result<HttpReply, TransportError> {
        self.requests.lock().expect("requests lock").push(call.clone());
        let mut routes = self.routes.lock().expect("routes lock");
        routes
            .iter_mut()
            .find(|(fragment, replies)| call.url.contains(fragment.as_str()) && !replies.is_empty())
            .and_then(|(_, replies)| replies.pop_front())
            .ok_or_else(|| TransportError::Network(format!("unexpected request to {}", call.url)))
    }
}

fn reply(status: u16, body: Value) -> HttpReply {
    HttpReply {
        status,
        status_text: String::new(),
        headers: ResponseHeaders::new(),
        body: Some(body),
    }
}

fn load_fixture() -> Solution {
    let document = include_str!("data/solution_fixture.json");
    serde_json::from_str(document).expect("load solution fixture")
}

fn settings() -> EngineSettings {
    EngineSettings {
        subscription_id: "sub-1".into(),
        progress_pause_ms: 0,
        ..EngineSettings::default()
    }
}

fn tokens() -> Arc<StaticTokenProvider> {
    Arc::new(StaticTokenProvider::new(Some("token-123".into())))
}

fn drain(event_rx: &mut UnboundedReceiver<ProvisioningEvent>) -> Vec<ProvisioningEvent> {
    let mut events = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        events.push(event);
    }
    events
}

fn happy_transport() -> RoutedTransport {
    let mut cluster_created = reply(201, json!({ "name": "adxabc12345" }));
    cluster_created.headers.insert(
        "azure-asyncoperation".into(),
        "https://management.azure.com/operations/adx-1".into(),
    );
    cluster_created.headers.insert("retry-after".into(), "10".into());

    RoutedTransport::default()
        .route("/resourcegroups/rg-abc12345", reply(201, json!({ "name": "rg-abc12345" })))
        .route("/clusters/adxabc12345", cluster_created)
        .route("/operations/adx-1", reply(200, json!({ "status": "Running" })))
        .route("/operations/adx-1", reply(200, json!({ "status": "Succeeded" })))
        .route(
            "iotc-abc12345.azureiotcentral.com",
            reply(200, json!({ "idScope": "0ne00ABC", "symmetricKey": { "primaryKey": "pk" } })),
        )
}

#[tokio::test(start_paused = true)]
async fn runs_steps_in_order_and_threads_outputs() {
    let transport = Arc::new(happy_transport());
    let (event_tx, mut event_rx) = unbounded_channel();
    let provisioner = Provisioner::new(transport.clone(), tokens(), settings(), Arc::new(event_tx));

    let mut solution = load_fixture();
    let report = provisioner.run(&mut solution).await;

    assert!(report.succeeded(), "report: {report:?}");
    assert_eq!(report.completed_steps, vec!["step-rg", "step-adx", "step-attestation"]);

    let urls: Vec<_> = transport.requests().into_iter().map(|call| call.url).collect();
    assert_eq!(
        urls,
        vec![
            "https://management.azure.com/subscriptions/sub-1/resourcegroups/rg-abc12345?api-version=2021-04-01",
            "https://management.azure.com/subscriptions/sub-1/resourceGroups/rg-abc12345/providers/Microsoft.Kusto/clusters/adxabc12345?api-version=2022-02-01",
            "https://management.azure.com/operations/adx-1",
            "https://management.azure.com/operations/adx-1",
            "https://iotc-abc12345.azureiotcentral.com/api/devices/opc-gateway/attestation?api-version=1.0",
        ]
    );

    let rg_outputs = &solution.deployment_configs[0].outputs;
    assert_eq!(rg_outputs.status, 201);
    assert_eq!(
        rg_outputs.parameters.as_ref().and_then(|parameters| parameters.get("resourceGroupName")),
        Some(&json!("rg-abc12345"))
    );

    let attestation_outputs = &solution.deployment_configs[2].outputs;
    let attestation_parameters = attestation_outputs.parameters.as_ref().expect("parameters persisted");
    assert_eq!(attestation_parameters["scopeId"], "0ne00ABC");
    assert_eq!(attestation_parameters["appSubdomain"], "iotc-abc12345");

    let events = drain(&mut event_rx);
    assert!(matches!(events.first(), Some(ProvisioningEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(ProvisioningEvent::RunCompleted { succeeded: true, .. })));
    let saved = events
        .iter()
        .filter(|event| matches!(event, ProvisioningEvent::OutputsSaved { .. }))
        .count();
    assert_eq!(saved, 3);
    assert!(events.iter().any(|event| matches!(
        event,
        ProvisioningEvent::Progress { message, step_id: Some(step_id) }
            if message == "Resource deployment status: Running" && step_id == "step-adx"
    )));
}

#[tokio::test(start_paused = true)]
async fn failing_step_halts_the_run() {
    let transport = Arc::new(
        RoutedTransport::default()
            .route("/resourcegroups/rg-abc12345", reply(201, json!({})))
            .route(
                "/clusters/adxabc12345",
                reply(409, json!({ "error": { "code": "Conflict", "message": "Cluster name is already taken" } })),
            ),
    );
    let (event_tx, mut event_rx) = unbounded_channel();
    let provisioner = Provisioner::new(transport.clone(), tokens(), settings(), Arc::new(event_tx));

    let mut solution = load_fixture();
    let report = provisioner.run(&mut solution).await;

    assert_eq!(report.completed_steps, vec!["step-rg"]);
    assert_eq!(report.failed_step.as_deref(), Some("step-adx"));
    assert_eq!(transport.requests().len(), 2);

    let failed_outputs = &solution.deployment_configs[1].outputs;
    assert_eq!(failed_outputs.status, 409);
    assert_eq!(failed_outputs.message, "Cluster name is already taken");
    assert!(failed_outputs.parameters.is_none());
    assert_eq!(solution.deployment_configs[2].outputs.status, 0);

    let events = drain(&mut event_rx);
    let service_errors: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ProvisioningEvent::ServiceError(error) => Some(error.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(service_errors.len(), 1);
    assert_eq!(service_errors[0].status, 409);
    assert_eq!(service_errors[0].title, "createAdxCluster");
    assert!(!events.iter().any(|event| matches!(
        event,
        ProvisioningEvent::StepStarted { step_id } if step_id == "step-attestation"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        ProvisioningEvent::StepFinished { step_id } if step_id == "step-adx"
    )));
}

/// Records the provisioning state every time a step starts or finishes.
struct StateProbe {
    state: ProvisioningStateHandle,
    seen: Mutex<Vec<ProvisioningState>>,
}

impl ProgressSink for StateProbe {
    fn emit(&self, event: ProvisioningEvent) {
        if matches!(event, ProvisioningEvent::StepStarted { .. } | ProvisioningEvent::StepFinished { .. }) {
            self.seen.lock().expect("seen lock").push(self.state.get());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn state_is_active_only_while_running() {
    let state = ProvisioningStateHandle::default();
    let probe = Arc::new(StateProbe {
        state: state.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let provisioner = Provisioner::new(Arc::new(happy_transport()), tokens(), settings(), probe.clone()).with_state_handle(state);

    assert_eq!(provisioner.provisioning_state(), ProvisioningState::Inactive);
    let mut solution = load_fixture();
    let report = provisioner.run(&mut solution).await;
    assert!(report.succeeded());
    assert_eq!(provisioner.provisioning_state(), ProvisioningState::Inactive);

    let seen = probe.seen.lock().expect("seen lock").clone();
    assert_eq!(seen.len(), 6);
    assert!(seen.iter().all(|state| *state == ProvisioningState::Active));
}

#[tokio::test(start_paused = true)]
async fn template_errors_fail_the_step_without_a_request() {
    let transport = Arc::new(RoutedTransport::default());
    let (event_tx, mut event_rx) = unbounded_channel();
    let provisioner = Provisioner::new(transport.clone(), tokens(), settings(), Arc::new(event_tx));

    let mut solution = load_fixture();
    solution.deployment_configs.truncate(1);
    if let Some(api) = solution.deployment_configs[0].api.as_mut() {
        api.config["url"] = json!("https://management.azure.com/${resourceGroupId}");
    }

    let report = provisioner.run(&mut solution).await;

    assert_eq!(report.failed_step.as_deref(), Some("step-rg"));
    assert!(transport.requests().is_empty());
    let outputs = &solution.deployment_configs[0].outputs;
    assert_eq!(outputs.status, 500);
    assert!(outputs.message.contains("resourceGroupId"), "message: {}", outputs.message);
    assert!(
        drain(&mut event_rx)
            .iter()
            .any(|event| matches!(event, ProvisioningEvent::ServiceError(error) if error.title == "createResourceGroup"))
    );
}

struct ExplodingStep;

#[async_trait]
impl DeploymentStep for ExplodingStep {
    async fn run(
        &self,
        _config: &DeploymentStepConfig,
        _ctx: &mut StepContext<'_>,
        _api: Option<ApiCall>,
        _lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        panic!("step blew up");
    }
}

struct FailingStep;

#[async_trait]
impl DeploymentStep for FailingStep {
    async fn run(
        &self,
        _config: &DeploymentStepConfig,
        _ctx: &mut StepContext<'_>,
        _api: Option<ApiCall>,
        _lro_api: Option<ApiCall>,
    ) -> anyhow::Result<ServiceResponse> {
        anyhow::bail!("payload was not an object")
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_step_is_contained() {
    let transport = Arc::new(happy_transport());
    let (event_tx, mut event_rx) = unbounded_channel();
    let provisioner = Provisioner::new(transport.clone(), tokens(), settings(), Arc::new(event_tx))
        .with_registry(StepRegistry::with_builtin_steps().register("createAdxCluster", ExplodingStep));

    let mut solution = load_fixture();
    let report = provisioner.run(&mut solution).await;

    assert_eq!(report.failed_step.as_deref(), Some("step-adx"));
    assert_eq!(provisioner.provisioning_state(), ProvisioningState::Inactive);
    let outputs = &solution.deployment_configs[1].outputs;
    assert_eq!(outputs.status, 500);
    assert!(outputs.message.contains("step blew up"));

    let events = drain(&mut event_rx);
    assert!(events.iter().any(|event| matches!(
        event,
        ProvisioningEvent::StepFinished { step_id } if step_id == "step-adx"
    )));
    assert!(matches!(events.last(), Some(ProvisioningEvent::RunCompleted { succeeded: false, .. })));
}

#[tokio::test(start_paused = true)]
async fn step_errors_become_internal_errors() {
    let provisioner = Provisioner::new(Arc::new(happy_transport()), tokens(), settings(), Arc::new(sb_engine::NullProgressSink))
        .with_registry(StepRegistry::with_builtin_steps().register("createResourceGroup", FailingStep));

    let mut solution = load_fixture();
    let report = provisioner.run(&mut solution).await;

    assert_eq!(report.failed_step.as_deref(), Some("step-rg"));
    let last = report.last_response.expect("last response");
    assert_eq!(last.status, 500);
    assert_eq!(last.message, "Error during provisioning step - Create resource group: payload was not an object");
}

#[tokio::test(start_paused = true)]
async fn started_run_reports_through_join_handle() {
    let provisioner = Arc::new(Provisioner::new(
        Arc::new(happy_transport()),
        tokens(),
        settings(),
        Arc::new(sb_engine::NullProgressSink),
    ));

    let (result, handle) = provisioner.start_provisioning(load_fixture()).await;
    assert!(result.ok);

    let (solution, report) = handle.expect("run spawned").await.expect("run joins");
    assert!(report.succeeded());
    assert!(solution.deployment_configs.iter().all(|config| config.outputs.status / 100 == 2));
}
