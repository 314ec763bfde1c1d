//! # Solution Builder Engine
//!
//! Provisions a multi-resource cloud solution by running its ordered
//! deployment steps against remote APIs, following each long-running
//! operation to completion and threading step outputs into later steps.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sb_api::{ReqwestTransport, StaticTokenProvider};
//! use sb_engine::{Provisioner, TracingProgressSink};
//! use sb_types::{EngineSettings, Solution};
//!
//! # async fn provision(solution: Solution) -> anyhow::Result<()> {
//! let settings = EngineSettings::default();
//! let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(120))?);
//! let provisioner = Arc::new(Provisioner::new(
//!     transport,
//!     Arc::new(StaticTokenProvider::from_env()),
//!     settings,
//!     Arc::new(TracingProgressSink),
//! ));
//!
//! let (started, handle) = provisioner.start_provisioning(solution).await;
//! if let Some(handle) = handle {
//!     let (_solution, report) = handle.await?;
//!     println!("{}: {} steps completed", started.message, report.completed_steps.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`resolve`**: the per-run parameter store and fragment resolver
//! - **`templates`**: `${...}` rendering of API call templates and scopes
//! - **`executor`**: token attachment, request dispatch and LRO polling
//! - **`steps`**: deployment step implementations and their registry
//! - **`provisioning`**: the provisioning loop and run invocation
//! - **`progress`**: observer sinks and paced progress reporting
//! - **`azure`**: provider constants and the run `context` entry

pub mod azure;
pub mod executor;
pub mod progress;
pub mod provisioning;
pub mod resolve;
pub mod steps;
pub mod templates;

#[cfg(test)]
mod test_support;

pub use executor::{ApiExecutor, NO_TOKEN_MESSAGE};
pub use progress::{NullProgressSink, Progress, ProgressSink, TracingProgressSink};
pub use provisioning::{Provisioner, ProvisioningStateHandle, STARTED_MESSAGE};
pub use resolve::{CONTEXT_ENTRY, ParameterStore, resolve_parameters};
pub use steps::{DeploymentStep, StepContext, StepRegistry};
pub use templates::{TemplateError, UnresolvedPlaceholder, collect_unresolved_placeholders, render_api_call};
