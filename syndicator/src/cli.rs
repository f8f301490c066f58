///
/// This module implements the CLI interface for syndicator: command parsing,
/// wiring the concrete collaborators into a [`CampaignOrchestrator`], and
/// printing the resulting run report.
///
/// All orchestration logic (validation, rotation, fan-out, retry) lives in
/// `syndicator-core`. This module is strictly CLI glue.
///
/// ## How To Use
/// - Command line: `syndicator run --config campaign.yaml`, then
///   `syndicator retry --config campaign.yaml --campaign-id <id>` for whatever
///   failed transiently, and `syndicator status ...` to inspect.
/// - Programmatic / integration tests: call [`run`] with a constructed [`Cli`].
///
/// Ctrl-C cancels the run cooperatively: units that have not started are left
/// pending and picked up by the next `retry`.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use syndicator_core::catalog::BuiltinCatalog;
use syndicator_core::contract::StaticDomainRegistry;
use syndicator_core::dispatch::ProgressEvent;
use syndicator_core::executor::Collaborators;
use syndicator_core::format::ContentFormatter;
use syndicator_core::orchestrator::{CampaignOrchestrator, RunReport};
use syndicator_core::tracked_url::TrackedUrlBuilder;
use tokio::sync::mpsc;

use crate::credentials::EnvCredentialStore;
use crate::file_store::JsonFileRunStateStore;
use crate::http::{HttpContentGenerator, HttpPublishAdapter};
use crate::load_config::{load_config, CliConfig};
use crate::notify::LogNotifier;

/// CLI for syndicator: publish one campaign across many domains.
#[derive(Parser)]
#[clap(
    name = "syndicator",
    version,
    about = "Publish a keyword campaign across many domains with template rotation, tracked links and partial retry"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new campaign run from the `campaign` section of the config file
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Re-dispatch the retryable and never-started domains of a stored campaign
    Retry {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        campaign_id: String,
    },
    /// Print the stored summary of a campaign without publishing anything
    Status {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        campaign_id: String,
    },
}

/// Wires the HTTP, environment and file-backed collaborators around the core.
pub fn build_orchestrator(config: &CliConfig) -> CampaignOrchestrator {
    config.orchestrator.trace_loaded();
    let credentials = Arc::new(EnvCredentialStore::new());
    let collaborators = Collaborators {
        generator: Arc::new(HttpContentGenerator::new_from_env(
            config.generator.endpoint.clone(),
        )),
        formatter: Arc::new(ContentFormatter),
        url_builder: Arc::new(TrackedUrlBuilder::new()),
        publisher: Arc::new(HttpPublishAdapter::new(config.domains.clone(), credentials)),
    };
    let registry = StaticDomainRegistry::new(config.domains.iter().map(|d| d.id.clone()).collect());
    CampaignOrchestrator::new(
        collaborators,
        Arc::new(registry),
        Arc::new(BuiltinCatalog),
        Arc::new(JsonFileRunStateStore::new(config.state_dir.clone())),
        config.orchestrator.clone(),
    )
    .with_notifier(Arc::new(LogNotifier))
}

/// Forwards progress events to the log until the orchestrator is dropped.
fn spawn_progress_logger() -> mpsc::UnboundedSender<ProgressEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::UnitFinished {
                    domain_id,
                    succeeded,
                    completed,
                    total,
                    ..
                } => tracing::info!(domain = %domain_id, succeeded, completed, total, "Progress"),
                ProgressEvent::UnitSkipped { domain_id, .. } => {
                    tracing::warn!(domain = %domain_id, "Skipped after cancellation")
                }
                ProgressEvent::UnitStarted { .. } => {}
            }
        }
    });
    tx
}

fn print_report(report: &RunReport) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&serde_json::json!({
        "campaign_id": report.state.campaign_id,
        "summary": report.summary,
        "successes": report.state.successes,
        "failures": report.state.failures,
        "pending": report.state.pending,
    }))
    .context("Failed to render run report")?;
    println!("{rendered}");
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let result = execute(cli).await;

    let span = tracing::info_span!("exit");
    let _entered = span.enter();
    match &result {
        Ok(()) => tracing::info!(success = true, "exit"),
        Err(e) => tracing::error!(success = false, error = %e, "exit"),
    }
    result
}

async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config)?;
            let request = config
                .campaign
                .clone()
                .context("config file has no `campaign` section to run")?;
            tracing::info!(command = "run", campaign_id = %request.campaign_id, "Starting campaign");
            let orchestrator =
                Arc::new(build_orchestrator(&config).with_progress(spawn_progress_logger()));
            cancel_on_ctrl_c(orchestrator.clone(), request.campaign_id.clone());
            let report = orchestrator
                .start_run(request)
                .await
                .context("campaign run failed")?;
            print_report(&report)
        }
        Commands::Retry {
            config,
            campaign_id,
        } => {
            let config = load_config(config)?;
            tracing::info!(command = "retry", campaign_id = %campaign_id, "Retrying campaign");
            let orchestrator =
                Arc::new(build_orchestrator(&config).with_progress(spawn_progress_logger()));
            cancel_on_ctrl_c(orchestrator.clone(), campaign_id.clone());
            let report = orchestrator
                .retry_run(&campaign_id)
                .await
                .context("campaign retry failed")?;
            print_report(&report)
        }
        Commands::Status {
            config,
            campaign_id,
        } => {
            let config = load_config(config)?;
            let orchestrator = build_orchestrator(&config);
            let report = orchestrator
                .status(&campaign_id)
                .await
                .context("campaign status failed")?;
            print_report(&report)
        }
    }
}

fn cancel_on_ctrl_c(orchestrator: Arc<CampaignOrchestrator>, campaign_id: String) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(campaign_id = %campaign_id, "Interrupt received, cancelling units that have not started");
            if !orchestrator.cancel_run(&campaign_id) {
                tracing::warn!(campaign_id = %campaign_id, "No active run to cancel");
            }
        }
    });
}
