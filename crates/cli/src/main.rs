use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use sb_api::{AzureCliTokenProvider, ReqwestTransport, StaticTokenProvider, TokenProvider};
use sb_engine::azure::run_context;
use sb_engine::{ParameterStore, Provisioner, collect_unresolved_placeholders, render_api_call, resolve_parameters};
use sb_types::{EngineSettings, ProvisioningEvent, Solution};
use sb_util::redact_sensitive;
use sb_util::settings::{default_settings_path, save_settings};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("provision", sub)) => run_provision(sub).await,
        Some(("render", sub)) => run_render(sub),
        Some(("settings", sub)) => run_settings(sub),
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

fn log_filter() -> EnvFilter {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    EnvFilter::new(directives)
}

fn build_cli() -> Command {
    let solution_arg = || {
        Arg::new("solution")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Path to the solution JSON document")
    };

    Command::new("sbprov")
        .about("Provision solution builder deployments")
        .subcommand(
            Command::new("provision")
                .about("Run every deployment step of a solution")
                .arg(solution_arg())
                .arg(
                    Arg::new("no-write")
                        .long("no-write")
                        .action(ArgAction::SetTrue)
                        .help("Do not write step outputs back to the solution file"),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Print the rendered calls of one step without executing them")
                .arg(solution_arg())
                .arg(Arg::new("step").long("step").short('s').required(true).help("Deployment step id")),
        )
        .subcommand(
            Command::new("settings")
                .about("Show or update engine settings")
                .arg(Arg::new("subscription-id").long("subscription-id").help("Subscription used for resource names"))
                .arg(
                    Arg::new("progress-pause-ms")
                        .long("progress-pause-ms")
                        .value_parser(value_parser!(u64))
                        .help("Pause after each paced progress message"),
                )
                .arg(
                    Arg::new("http-timeout-secs")
                        .long("http-timeout-secs")
                        .value_parser(value_parser!(u64))
                        .help("Per-request HTTP timeout"),
                ),
        )
}

fn load_solution(path: &Path) -> Result<Solution> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing solution {}", path.display()))
}

fn token_provider() -> Arc<dyn TokenProvider> {
    let env_tokens = StaticTokenProvider::from_env();
    if env_tokens.has_default() {
        debug!("using access token from environment");
        Arc::new(env_tokens)
    } else {
        Arc::new(AzureCliTokenProvider::default())
    }
}

async fn run_provision(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("solution")
        .context("expected a solution path")?
        .clone();
    let write_back = !matches.get_flag("no-write");

    let solution = load_solution(&path)?;
    let settings = sb_util::load_settings()?;
    let transport = Arc::new(ReqwestTransport::new(settings.http_timeout())?);

    let (event_tx, event_rx) = unbounded_channel();
    let printer = tokio::spawn(print_events(event_rx));
    let provisioner = Arc::new(Provisioner::new(transport, token_provider(), settings, Arc::new(event_tx)));

    let (started, handle) = provisioner.start_provisioning(solution).await;
    let Some(handle) = handle else {
        bail!(started.message);
    };
    println!("{}", started.message);

    let (solution, report) = handle.await.context("provisioning task failed")?;
    // Dropping the last provisioner closes the event channel.
    drop(provisioner);
    let _ = printer.await;

    if write_back {
        fs::write(&path, serde_json::to_string_pretty(&solution)?).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "step outputs written back");
    }

    println!(
        "{} of {} steps completed",
        report.completed_steps.len(),
        solution.deployment_configs.len()
    );
    if let Some(failed_step) = report.failed_step {
        bail!("provisioning halted at step '{failed_step}'");
    }
    Ok(())
}

async fn print_events(mut event_rx: UnboundedReceiver<ProvisioningEvent>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            ProvisioningEvent::StepStarted { step_id } => println!("==> {step_id}"),
            ProvisioningEvent::Progress { message, .. } => println!("    {message}"),
            ProvisioningEvent::ServiceError(error) => {
                eprintln!("error [{}] {}: {}", error.status, error.title, error.message)
            }
            ProvisioningEvent::OutputsSaved { step_id, outputs } => {
                debug!(step_id = %step_id, status = outputs.status, "outputs saved")
            }
            _ => {}
        }
    }
}

fn run_render(matches: &ArgMatches) -> Result<()> {
    let path = matches.get_one::<PathBuf>("solution").context("expected a solution path")?;
    let step_id = matches.get_one::<String>("step").context("expected a step id")?;

    let solution = load_solution(path)?;
    let settings = sb_util::load_settings()?;
    let rendered = render_step(&solution, step_id, &settings)?;
    println!("{}", redact_sensitive(&serde_json::to_string_pretty(&rendered)?));
    Ok(())
}

/// Renders one step the way a run would, using the outputs recorded for
/// earlier steps as their parameters.
fn render_step(solution: &Solution, step_id: &str, settings: &EngineSettings) -> Result<Value> {
    let index = solution
        .deployment_configs
        .iter()
        .position(|config| config.id == step_id)
        .with_context(|| format!("step '{step_id}' not found in solution '{}'", solution.name))?;

    let mut store = ParameterStore::default();
    store.seed_context(run_context(solution, settings));
    for earlier in &solution.deployment_configs[..index] {
        if let Some(parameters) = &earlier.outputs.parameters {
            store.merge(&earlier.item_step, parameters.clone());
        }
    }

    let config = &solution.deployment_configs[index];
    let resolved = resolve_parameters(&config.parameters, &store);

    let mut unresolved = Vec::new();
    let mut calls = Map::new();
    for (label, template) in [("api", config.api.as_ref()), ("lroApi", config.lro_api.as_ref())] {
        let Some(template) = template else {
            continue;
        };
        collect_unresolved_placeholders(&template.config, label, &resolved, &mut unresolved);
        let call = match render_api_call(&template.config, &resolved) {
            Ok(call) => serde_json::to_value(call)?,
            Err(error) => json!({ "error": error.to_string() }),
        };
        calls.insert(
            label.to_string(),
            json!({ "apiAuthScope": template.api_auth_scope, "call": call }),
        );
    }

    Ok(json!({
        "step": config.id,
        "itemStep": config.item_step,
        "parameters": resolved,
        "calls": calls,
        "unresolved": unresolved,
    }))
}

fn run_settings(matches: &ArgMatches) -> Result<()> {
    let path = default_settings_path();
    let mut settings = sb_util::load_settings_from(&path)?;

    let mut changed = false;
    if let Some(subscription_id) = matches.get_one::<String>("subscription-id") {
        settings.subscription_id = subscription_id.trim().to_string();
        changed = true;
    }
    if let Some(pause) = matches.get_one::<u64>("progress-pause-ms") {
        settings.progress_pause_ms = *pause;
        changed = true;
    }
    if let Some(timeout) = matches.get_one::<u64>("http-timeout-secs") {
        settings.http_timeout_secs = *timeout;
        changed = true;
    }

    if changed {
        save_settings(&path, &settings)?;
        info!(path = %path.display(), "settings saved");
    }
    println!("{}", path.display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
