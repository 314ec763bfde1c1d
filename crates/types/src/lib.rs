//! Shared type definitions for the solution builder workspace.
//!
//! The engine, the API collaborators and the CLI shell all exchange these
//! models, so they carry no behavior beyond small accessors.

pub mod provisioning;
pub mod service;
pub mod settings;
pub mod solution;

pub use provisioning::{ProvisioningEvent, ProvisioningState, RunReport, StartResult};
pub use service::{ResponseHeaders, ServiceError, ServiceResponse, service_response_succeeded};
pub use settings::EngineSettings;
pub use solution::{ApiCall, ApiCallTemplate, DeploymentStepConfig, ResourceType, SOLUTION_FILE_TYPE, Solution, StepOutputs};
