//! Bounded wait-until-ready loop shared by steps whose resource keeps
//! starting after its creation call completes.
//!
//! The readiness call is re-issued on the configured poll interval until it
//! succeeds or the step's wall-clock limit is exceeded. Only the status check
//! is retried, never the creating call.

use std::time::Duration;

use sb_types::ApiCall;
use tokio::time::Instant;
use tracing::info;

use super::StepContext;

/// Parameters of one readiness wait.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessWait<'a> {
    /// Name used in log lines.
    pub label: &'a str,
    pub max_wait: Duration,
    /// When set, every failed check reports `"{progress_text} (est. N%)..."`
    /// with N derived from elapsed time over this expected duration.
    pub estimate: Option<Duration>,
    pub progress_text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut { elapsed: Duration },
}

/// Whole percent of `expected` covered by `elapsed`, unbounded above.
pub fn estimated_percent(elapsed: Duration, expected: Duration) -> u64 {
    let expected = expected.as_secs();
    if expected == 0 {
        return 100;
    }
    elapsed.as_secs() * 100 / expected
}

/// Polls `call` until it succeeds or `wait.max_wait` is exceeded.
pub async fn wait_until_ready(ctx: &StepContext<'_>, call: &ApiCall, scope: &str, wait: ReadinessWait<'_>) -> Readiness {
    let interval = ctx.settings.readiness_poll_interval();
    let started = Instant::now();

    loop {
        let check = ctx.execute(call, scope).await;
        if check.succeeded() {
            info!(label = wait.label, elapsed_secs = started.elapsed().as_secs(), "resource is ready");
            return Readiness::Ready;
        }

        let elapsed = started.elapsed();
        if let Some(expected) = wait.estimate {
            let percent = estimated_percent(elapsed, expected);
            ctx.show_progress(&format!("{} (est. {percent}%)...", wait.progress_text)).await;
        }
        info!(label = wait.label, elapsed_secs = elapsed.as_secs(), status = check.status, "waiting for resource");

        if elapsed.as_secs() > wait.max_wait.as_secs() {
            return Readiness::TimedOut { elapsed };
        }

        tokio::time::sleep(interval).await;
    }
}
