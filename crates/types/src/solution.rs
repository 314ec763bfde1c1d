//! Solution documents and deployment step configuration.
//!
//! These models mirror the JSON solution documents authored for the
//! provisioning engine. Field names are camelCase on the wire so documents
//! round-trip without loss, and unknown payload shapes are kept as raw JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File type marker carried by every solution document.
pub const SOLUTION_FILE_TYPE: &str = "2cb82afd-08e2-4cc6-ba9e-a37afa4b7175";

/// Kind of cloud resource a step provisions. Only used for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    ResourceGroup,
    IoTCentral,
    VirtualMachine,
    IoTEdge,
    AzureDataExplorer,
    ArcServer,
}

/// A provisioning run: an ordered sequence of deployment step configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    #[serde(default = "default_file_type")]
    pub file_type: String,
    pub name: String,
    pub id: String,
    /// Suffix appended to every generated resource name.
    pub resource_name_suffix: String,
    /// Target region, e.g. `eastus`.
    pub resource_location: String,
    #[serde(default)]
    pub deployment_configs: Vec<DeploymentStepConfig>,
}

fn default_file_type() -> String {
    SOLUTION_FILE_TYPE.to_string()
}

/// Single unit of the provisioning sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStepConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ResourceType>,
    /// Step-type identifier selecting the deployment step implementation.
    pub item_step: String,
    #[serde(default)]
    pub doc_link: String,
    /// Parameter-expression map, see the parameter resolver for the grammar.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiCallTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lro_api: Option<ApiCallTemplate>,
    #[serde(default)]
    pub outputs: StepOutputs,
}

/// Static API call template together with the scope its token must cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallTemplate {
    pub api_auth_scope: String,
    /// Raw template, possibly containing `${...}` placeholders anywhere.
    pub config: Value,
}

/// Concrete API call produced by rendering an [`ApiCallTemplate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiCall {
    /// Convenience constructor for a body-less GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            headers: IndexMap::new(),
            data: None,
        }
    }
}

/// Persisted result of one deployment step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutputs {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
    /// Resolved and produced parameters, present only when the step succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}
