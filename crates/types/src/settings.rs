//! Engine tunables loaded from the user settings file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persisted engine settings. Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Subscription seeded into the run-wide `context` parameters.
    pub subscription_id: String,
    /// Pause after a paced progress message so observers can render it.
    pub progress_pause_ms: u64,
    /// Poll interval used when a provider omits `retry-after`.
    pub default_retry_after_secs: u64,
    /// Interval between readiness checks of steps that wait for a resource.
    pub readiness_poll_interval_ms: u64,
    /// Per-request timeout of the HTTP client.
    pub http_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            progress_pause_ms: 1000,
            default_retry_after_secs: 5,
            readiness_poll_interval_ms: 3000,
            http_timeout_secs: 120,
        }
    }
}

impl EngineSettings {
    pub fn progress_pause(&self) -> Duration {
        Duration::from_millis(self.progress_pause_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
