///
/// This module implements the CLI interface for depchain: command parsing,
/// wiring of the concrete collaborators and user-visible output.
///
/// All reconciliation logic (derivation, diffing, pagination, creation) lives
/// in the [`depchain-core`] crate. This module is strictly CLI glue.
///
/// ## Commands
/// - `audit`: read-only diff between the store and the build system.
/// - `initialize`: backfill every interesting release.
/// - `handle`: apply one build-system bus message.
///
/// [`depchain-core`]: ../../depchain-core/
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use depchain_core::reconcile::{HandleOutcome, Reconciler};
use depchain_core::release::ReleaseResolver;
use depchain_core::store::StoreClient;

use crate::http::HttpTransport;
use crate::load_config::{load_config, CliConfig, TOKEN_ENV};
use crate::snapshot::SnapshotBuildSystem;

/// CLI for depchain: keep catalog dependency relationships in sync with the build system.
#[derive(Parser)]
#[clap(
    name = "depchain",
    version,
    about = "Audit and synchronise build-time and run-time dependency relationships in the package catalog"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report relationships the store has but should not, and lacks but should have
    Audit {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Backfill relationships for every tracked release
    Initialize {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Apply a single build-system message
    Handle {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Path to the JSON message
        #[clap(long)]
        message: PathBuf,
    },
}

struct Wiring {
    reconciler: Reconciler,
    store: StoreClient<HttpTransport>,
}

async fn wire(config: &CliConfig) -> Result<Wiring> {
    let build_system = Arc::new(SnapshotBuildSystem::load(&config.build_system.snapshot)?);
    let resolver = ReleaseResolver::discover(
        build_system.as_ref(),
        &config.tags.tracked,
        config.tags.mapping.clone(),
    )
    .await
    .context("Failed to resolve the development tag")?;

    let reconciler = Reconciler::new(config.kind, build_system, resolver)
        .with_settings(config.reconcile_settings());
    let transport = HttpTransport::new(config.store.url.clone(), config.store.token.clone())
        .context("Failed to construct store transport")?;
    let store = StoreClient::new(transport).with_retry(config.retry_policy());

    Ok(Wiring { reconciler, store })
}

fn require_token(config: &CliConfig, command: &str) -> Result<()> {
    if config.store.token.is_none() {
        tracing::error!(command, "Store token missing for a writing command");
        anyhow::bail!("{command} writes to the store: set {TOKEN_ENV} in the environment");
    }
    Ok(())
}

fn read_message(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read message file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse message file {}", path.display()))
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Audit { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "audit", "Starting audit");
            let Wiring { reconciler, store } = wire(&config).await?;
            let report = reconciler
                .audit(&store)
                .await
                .context("Audit failed")?;

            for descriptor in &report.present {
                println!("- {descriptor}");
            }
            for descriptor in &report.absent {
                println!("+ {descriptor}");
            }
            println!(
                "Audit complete: {} present, {} absent",
                report.present.len(),
                report.absent.len()
            );
            tracing::info!(command = "audit", clean = report.is_clean(), "Audit complete");
            Ok(())
        }
        Commands::Initialize { config } => {
            let config = load_config(config)?;
            require_token(&config, "initialize")?;
            tracing::info!(command = "initialize", "Starting initialization");
            let Wiring { reconciler, store } = wire(&config).await?;
            let report = reconciler
                .initialize(&store)
                .await
                .context("Initialize failed")?;
            println!(
                "Initialize complete: {} releases, {} batches, {} relationships",
                report.releases.len(),
                report.batches,
                report.relationships
            );
            tracing::info!(command = "initialize", ?report, "Initialization complete");
            Ok(())
        }
        Commands::Handle { config, message } => {
            let config = load_config(config)?;
            require_token(&config, "handle")?;
            let message = read_message(&message)?;
            let Wiring { reconciler, store } = wire(&config).await?;
            let outcome = reconciler
                .handle_message(&store, &message)
                .await
                .context("Handling message failed")?;
            match &outcome {
                HandleOutcome::Skipped => println!("Message skipped"),
                HandleOutcome::Applied {
                    release,
                    components,
                    relationships,
                } => println!(
                    "Message applied to {release}: {components} components, {relationships} relationships"
                ),
            }
            tracing::info!(command = "handle", ?outcome, "Message handled");
            Ok(())
        }
    }
}
