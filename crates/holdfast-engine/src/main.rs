//! Simulation engine binary for Holdfast.
//!
//! Wires configuration, world generation, the reasoning provider, and the
//! event store into a [`TickScheduler`] and runs it until an end
//! condition or Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from the path given as the first argument, or
//!    `HOLDFAST_CONFIG`, or `holdfast.yaml`, falling back to defaults
//! 3. Create the reasoning provider from `HOLDFAST_PROVIDER` and friends
//! 4. Open the event store (file-backed when `storage` paths are set)
//! 5. Generate the seeded world, or resume an existing event log
//! 6. Run the tick loop; Ctrl-C requests a clean stop

mod error;
mod worldgen;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use holdfast_core::config::StorageConfig;
use holdfast_core::{ConfigHandle, DecisionOrchestrator, SimulationConfig, TickScheduler};
use holdfast_events::{
    DirectorySnapshotStore, EventLog, EventStore, JsonlEventLog, MemoryEventLog,
    MemorySnapshotStore, SnapshotStore,
};
use holdfast_runner::{ProviderConfig, ProviderRegistry, create_provider};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file looked up in the working directory when none is named.
const DEFAULT_CONFIG_FILE: &str = "holdfast.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize structured logging.
    init_tracing();
    info!("holdfast-engine starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        seed = config.world.seed,
        width = config.world.width,
        height = config.world.height,
        tick_interval_ms = config.tick.interval_ms,
        max_ticks = config.tick.max_ticks,
        provider_timeout_ms = config.decision.provider_timeout_ms,
        "Configuration loaded"
    );

    // 3. Reasoning provider.
    let provider_config = ProviderConfig::from_env().context("provider configuration")?;
    let provider = Arc::new(create_provider(&provider_config, config.survival_thresholds()));
    info!(provider = provider.id(), model = %provider_config.model, "Reasoning provider ready");
    let orchestrator = DecisionOrchestrator::new(ProviderRegistry::new(provider), &config);

    // 4. Event store.
    let store = Arc::new(open_store(&config.storage)?);

    // 5. Fresh world or resumed stream.
    let handle = ConfigHandle::new(config.clone());
    let mut scheduler = if store.is_empty()? {
        let world = worldgen::generate(&config.world, &config.economy)?;
        TickScheduler::new(world, store, orchestrator, handle)?
    } else {
        let status = store.verify_chain()?;
        if let holdfast_events::ChainStatus::Broken { sequence, reason } = status {
            return Err(EngineError::CorruptLog {
                path: describe(config.storage.event_log.as_deref()),
                detail: format!("sequence {sequence}: {reason}"),
            }
            .into());
        }
        TickScheduler::resume(store, orchestrator, handle)?
    };
    info!(
        run_id = %scheduler.run_id(),
        tick = scheduler.world().tick,
        agents = scheduler.world().agents.len(),
        "Simulation state assembled, entering tick loop"
    );

    // 6. Run until done or interrupted.
    let controls = scheduler.controls();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping after the current tick");
                controls.request_stop();
            }
            Err(err) => warn!(error = %err, "Could not listen for Ctrl-C"),
        }
    });

    let reason = scheduler.start().await?;
    info!(
        end_reason = ?reason,
        total_ticks = scheduler.world().tick,
        events = scheduler.store().len()?,
        "holdfast-engine shutdown complete"
    );
    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` selects levels (default `info`); `HOLDFAST_LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new("info"));
    let json = std::env::var("HOLDFAST_LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Resolve and load the configuration file, applying `HOLDFAST_*`
/// overrides either way.
fn load_config() -> anyhow::Result<SimulationConfig> {
    let named = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOLDFAST_CONFIG").map(PathBuf::from));
    let path = match named {
        Some(path) => Some(path),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|path| path.exists()),
    };
    match path {
        Some(path) => SimulationConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display())),
        None => {
            info!("Config file not found, using defaults");
            SimulationConfig::parse("").context("applying environment overrides")
        }
    }
}

/// Open file-backed logs where paths are configured, memory otherwise.
fn open_store(storage: &StorageConfig) -> anyhow::Result<EventStore> {
    let log: Box<dyn EventLog> = match &storage.event_log {
        Some(path) => {
            info!(path = %path.display(), "Opening event log");
            Box::new(JsonlEventLog::open(path)?)
        }
        None => {
            warn!("No event log configured, history will not survive a restart");
            Box::new(MemoryEventLog::new())
        }
    };
    let snapshots: Box<dyn SnapshotStore> = match &storage.snapshot_dir {
        Some(dir) => Box::new(DirectorySnapshotStore::open(dir)?),
        None => Box::new(MemorySnapshotStore::new()),
    };
    Ok(EventStore::open(log, snapshots)?)
}

fn describe(path: Option<&Path>) -> String {
    path.map_or_else(|| String::from("<memory>"), |path| path.display().to_string())
}
