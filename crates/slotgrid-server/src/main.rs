//! Slotgrid Server
//!
//! Hosts the grid registry for one control plane: the node model, its event
//! listener and the reaper.

use anyhow::Context;
use clap::Parser;
use slotgrid_core::{init_telemetry, IoContext, SlotgridConfig, TelemetryConfig};
use slotgrid_registry::{EventBus, GridModel, LocalEventBus, Reaper};
use std::path::Path;
use std::sync::Arc;

/// Slotgrid server CLI
#[derive(Parser, Debug)]
#[command(name = "slotgrid-server")]
#[command(about = "Slotgrid browser-automation grid control plane")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SLOTGRID_CONFIG", default_value = "slotgrid.yaml")]
    config: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// Emit JSON log lines
    #[arg(long, env = "SLOTGRID_LOG_JSON")]
    json_logs: bool,

    /// Enable verbose logging (-v debug, -vv trace); overrides RUST_LOG
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(path: &str) -> anyhow::Result<SlotgridConfig> {
    if Path::new(path).exists() {
        SlotgridConfig::from_yaml_file(path).with_context(|| format!("loading {}", path))
    } else {
        tracing::warn!(path, "Config file not found, using defaults");
        Ok(SlotgridConfig::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if cli.verbose > 0 {
        let level = if cli.verbose == 1 { "debug" } else { "trace" };
        telemetry = telemetry.with_log_level(level).without_env_filter();
    }
    if cli.json_logs {
        telemetry = telemetry.with_json();
    }
    let _guard = init_telemetry(telemetry).context("initializing telemetry")?;

    let config = load_config(&cli.config)?;
    config.validate().context("invalid configuration")?;

    if cli.check_config {
        tracing::info!(config = %cli.config, "Configuration is valid");
        return Ok(());
    }

    tracing::info!(
        config = %cli.config,
        unhealthy_threshold = config.registry.unhealthy_threshold,
        purge_timeout_multiplier = config.registry.purge_timeout_multiplier,
        "Slotgrid server starting"
    );

    let io = IoContext::production();
    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new(&config.events));
    let model = Arc::new(GridModel::new(bus, io.time.clone(), config.registry.clone()));
    let listener = model.spawn_event_listener();

    let reaper = config
        .reaper
        .enabled
        .then(|| Reaper::start(model.clone(), &config.reaper, io.time.clone()));
    if reaper.is_none() {
        tracing::warn!("Reaper disabled, dead nodes will not be purged");
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    if let Some(reaper) = reaper {
        reaper.shutdown().await;
    }
    listener.abort();

    let snapshot = model.snapshot().await;
    tracing::info!(nodes = snapshot.len(), "Slotgrid server stopped");

    Ok(())
}
