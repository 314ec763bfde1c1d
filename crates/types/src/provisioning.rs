//! Provisioning run lifecycle types shared between the engine and its shells.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ServiceError, ServiceResponse, StepOutputs};

/// Whether a provisioning run is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    Active,
    Inactive,
}

/// Result of a run invocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResult {
    pub ok: bool,
    pub message: String,
}

/// Lifecycle notifications emitted during a provisioning run.
///
/// Events are fire-and-forget; the engine never waits for an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisioningEvent {
    RunStarted {
        at: DateTime<Utc>,
    },
    Progress {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
    },
    StepStarted {
        step_id: String,
    },
    StepFinished {
        step_id: String,
    },
    ServiceError(ServiceError),
    OutputsSaved {
        step_id: String,
        outputs: StepOutputs,
    },
    RunCompleted {
        finished_at: DateTime<Utc>,
        succeeded: bool,
    },
}

/// Summary returned once a run has finished, halted, or aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ids of the steps that completed successfully, in execution order.
    pub completed_steps: Vec<String>,
    /// Id of the step that halted the run, if any.
    pub failed_step: Option<String>,
    /// Response of the last executed step.
    pub last_response: Option<ServiceResponse>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failed_step.is_none()
    }
}
