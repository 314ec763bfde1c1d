//! Observer plumbing for provisioning runs.
//!
//! Observers implement [`ProgressSink`]. Every notification is
//! fire-and-forget: the engine never waits for, or depends on, an observer.
//! The `UnboundedSender<ProvisioningEvent>` implementation lets a shell own
//! the receiving end of a Tokio channel, and drain run events at its own pace.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sb_types::{ProvisioningEvent, ServiceError, StepOutputs};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Receives provisioning lifecycle notifications.
pub trait ProgressSink: Send + Sync {
    /// Delivers a single event. Must not block.
    fn emit(&self, event: ProvisioningEvent);

    fn on_progress(&self, message: &str, step_id: Option<&str>) {
        self.emit(ProvisioningEvent::Progress {
            message: message.to_string(),
            step_id: step_id.map(str::to_string),
        });
    }

    fn on_step_started(&self, step_id: &str) {
        self.emit(ProvisioningEvent::StepStarted {
            step_id: step_id.to_string(),
        });
    }

    fn on_step_finished(&self, step_id: &str) {
        self.emit(ProvisioningEvent::StepFinished {
            step_id: step_id.to_string(),
        });
    }

    fn on_service_error(&self, error: &ServiceError) {
        self.emit(ProvisioningEvent::ServiceError(error.clone()));
    }

    fn on_outputs_saved(&self, step_id: &str, outputs: &StepOutputs) {
        self.emit(ProvisioningEvent::OutputsSaved {
            step_id: step_id.to_string(),
            outputs: outputs.clone(),
        });
    }

    fn on_run_started(&self) {
        self.emit(ProvisioningEvent::RunStarted { at: Utc::now() });
    }

    fn on_run_completed(&self, succeeded: bool) {
        self.emit(ProvisioningEvent::RunCompleted {
            finished_at: Utc::now(),
            succeeded,
        });
    }
}

impl ProgressSink for UnboundedSender<ProvisioningEvent> {
    fn emit(&self, event: ProvisioningEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(event);
    }
}

/// Sink that writes every event to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn emit(&self, event: ProvisioningEvent) {
        match event {
            ProvisioningEvent::Progress { message, step_id } => info!(step_id = step_id.as_deref(), "{message}"),
            ProvisioningEvent::ServiceError(error) => {
                warn!(status = error.status, title = %error.title, "{}", error.message)
            }
            other => debug!(event = ?other, "provisioning event"),
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: ProvisioningEvent) {}
}

/// Progress reporter handed to steps and the poller.
///
/// A paced message suspends the calling flow for the configured pause after
/// emitting, giving observers a chance to render it before work resumes.
#[derive(Clone)]
pub struct Progress {
    sink: Arc<dyn ProgressSink>,
    pause: Duration,
    step_id: Option<String>,
}

impl Progress {
    pub fn new(sink: Arc<dyn ProgressSink>, pause: Duration) -> Self {
        Self {
            sink,
            pause,
            step_id: None,
        }
    }

    /// Returns a reporter that tags messages with `step_id`.
    pub fn for_step(&self, step_id: &str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            pause: self.pause,
            step_id: Some(step_id.to_string()),
        }
    }

    /// Emits `message`; when `paced`, then sleeps for the configured pause.
    pub async fn show(&self, message: &str, paced: bool) {
        self.sink.on_progress(message, self.step_id.as_deref());
        if paced && !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("pause", &self.pause)
            .field("step_id", &self.step_id)
            .finish()
    }
}
