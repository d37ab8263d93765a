//! relaybot CLI entry point.
//!
//! Provides `start`, `check`, and `pipelines` subcommands for running the
//! relay, validating a configuration, or listing the configured pipelines.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use relaybot::config::{load_config, runtime_paths, Config, RuntimePaths};
use relaybot::credentials::{load_default_credentials, Credentials};
use relaybot::dispatch::DispatchEngine;
use relaybot::notifier::run_notifier;
use relaybot::pipelines::{build_pipeline, build_pipelines, Placement};
use relaybot::services::Services;
use relaybot::storage::Store;
use relaybot::transport::TransportRegistry;

/// relaybot: one dispatcher for WhatsApp, Telegram, Signal and friends.
#[derive(Parser)]
#[command(name = "relaybot", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the relay until interrupted.
    Start {
        /// Config file (default `~/.relaybot/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate the config and build every transport and pipeline, then exit.
    Check {
        /// Config file (default `~/.relaybot/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the configured pipelines and their help text.
    Pipelines {
        /// Config file (default `~/.relaybot/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { config } => handle_start(config).await,
        Command::Check { config } => handle_check(config).await,
        Command::Pipelines { config } => handle_pipelines(config).await,
    }
}

fn load(paths: &RuntimePaths, config: Option<PathBuf>) -> anyhow::Result<(Config, Credentials)> {
    let config_path = config.unwrap_or_else(|| paths.config_toml.clone());
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let credentials = load_default_credentials()
        .with_context(|| format!("failed to load {}", paths.env_file.display()))?;
    Ok((config, credentials))
}

async fn open_store(paths: &RuntimePaths, config: &Config) -> anyhow::Result<Store> {
    let database = config
        .storage
        .database
        .clone()
        .unwrap_or_else(|| paths.database());
    Store::open(&database)
        .await
        .with_context(|| format!("failed to open database {}", database.display()))
}

/// Run the relay.
async fn handle_start(config: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = runtime_paths()?;
    let _logging_guard = relaybot::logging::init_production(&paths.logs_dir)?;

    let (config, credentials) = load(&paths, config)?;
    let store = open_store(&paths, &config).await?;
    let services = Services::from_config(&config.services, &credentials)
        .context("failed to configure services")?;

    let registry = TransportRegistry::from_config(&config.transports, &credentials)
        .context("failed to configure transports")?;
    if registry.is_empty() {
        warn!("no transports configured, nothing will be received");
    }
    let registry = Arc::new(registry);

    let mut engine = DispatchEngine::with_config(Arc::clone(&registry), &config.dispatch);
    build_pipelines(&config.pipelines, &services, &store, &mut engine)
        .context("failed to build pipelines")?;
    let engine = Arc::new(engine);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let receive_loops = registry.spawn_receive_loops(&engine);
    let notifier = tokio::spawn(run_notifier(
        Arc::clone(&registry),
        config.notifications.clone(),
        shutdown_rx,
    ));

    info!(transports = registry.len(), "relaybot started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("received shutdown signal");

    // Receive loops reconnect forever; they only stop when aborted.
    for handle in &receive_loops {
        handle.abort();
    }
    let _ = shutdown_tx.send(true);
    if let Err(e) = notifier.await {
        warn!(error = %e, "notifier ended abnormally");
    }
    store.pool().close().await;

    info!("relaybot stopped");
    Ok(())
}

/// Validate configuration and construction without connecting anywhere.
async fn handle_check(config: Option<PathBuf>) -> anyhow::Result<()> {
    relaybot::logging::init_cli();

    let paths = runtime_paths()?;
    let (config, credentials) = load(&paths, config)?;

    let services = Services::from_config(&config.services, &credentials)
        .context("failed to configure services")?;
    let registry = TransportRegistry::from_config(&config.transports, &credentials)
        .context("failed to configure transports")?;
    let store = Store::in_memory()
        .await
        .context("failed to open scratch database")?;

    let mut engine = DispatchEngine::with_config(Arc::new(registry), &config.dispatch);
    build_pipelines(&config.pipelines, &services, &store, &mut engine)
        .context("failed to build pipelines")?;

    let (external, self_authored) = engine.pipeline_counts();
    info!(
        platforms = ?engine.registry().platforms(),
        external,
        self_authored,
        notifications = config.notifications.len(),
        "configuration ok"
    );
    Ok(())
}

/// Print each configured pipeline with its placement and help text.
async fn handle_pipelines(config: Option<PathBuf>) -> anyhow::Result<()> {
    relaybot::logging::init_cli();

    let paths = runtime_paths()?;
    let (config, credentials) = load(&paths, config)?;
    let services = Services::from_config(&config.services, &credentials)
        .context("failed to configure services")?;
    let store = Store::in_memory()
        .await
        .context("failed to open scratch database")?;

    for (index, pipeline_config) in config.pipelines.iter().enumerate() {
        let (pipeline, placement) = build_pipeline(pipeline_config, &services, &store)
            .with_context(|| format!("pipeline #{} is invalid", index.saturating_add(1)))?;
        let placement = match placement {
            Placement::External => "external",
            Placement::SelfAuthored => "self",
            Placement::Both => "both",
        };
        let help = pipeline.help_text().unwrap_or_default();
        println!("{:<12} {:<8} {help}", pipeline.name(), placement);
    }
    Ok(())
}
