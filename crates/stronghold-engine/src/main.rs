//! Engine binary for the Stronghold world core.
//!
//! Wires configuration, logging, the world catalog, the `PostgreSQL` world
//! store, NATS notifications, and the event scheduler into one process, then
//! runs the scheduler until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `config/stronghold-config.yaml`
//!    (or `$STRONGHOLD_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Load the world catalog
//! 4. Connect to `PostgreSQL` and run migrations
//! 5. Connect to NATS
//! 6. Build the coordinator and scheduler, load pending rows
//! 7. Subscribe to schedule intake
//! 8. Run the scheduler loop until shutdown

mod error;
mod intake;
mod nats_notifier;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stronghold_core::config::LoggingConfig;
use stronghold_core::{
    Clock, EventScheduler, StrongholdConfig, SystemClock, TownQueueCoordinator,
};
use stronghold_db::{PostgresConfig, PostgresPool};
use stronghold_world::SharedCatalog;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::nats_notifier::NatsNotifier;

const DEFAULT_CONFIG_PATH: &str = "config/stronghold-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any startup step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        world_name = config.world.name,
        config_path = %config_path.display(),
        catalog_path = config.world.catalog_path,
        max_attempts = config.scheduler.max_attempts,
        "stronghold-engine starting"
    );

    // 3. Load the world catalog.
    let catalog = Arc::new(SharedCatalog::from_file(Path::new(
        &config.world.catalog_path,
    ))?);
    spawn_catalog_reload(Arc::clone(&catalog));

    // 4. Connect to PostgreSQL.
    let pg = PostgresPool::connect(&PostgresConfig::from_infrastructure(
        &config.infrastructure,
    ))
    .await
    .map_err(EngineError::from)?;
    pg.run_migrations().await.map_err(EngineError::from)?;
    let store = Arc::new(pg.world_store());

    // 5. Connect to NATS.
    let nats_url = &config.infrastructure.nats_url;
    info!(nats_url = nats_url, "Connecting to NATS");
    let notifier = Arc::new(NatsNotifier::connect(nats_url).await?);
    let intake_client = notifier.client().clone();
    info!("NATS connected");

    // 6. Build the scheduler and load everything still pending.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let coordinator = TownQueueCoordinator::new(store, notifier, catalog, Arc::clone(&clock));
    let scheduler = Arc::new(EventScheduler::new(
        coordinator,
        clock,
        config.scheduler,
    ));
    let loaded = scheduler.load().await.map_err(EngineError::from)?;
    info!(loaded, "Pending rows scheduled");

    // 7. Subscribe to schedule intake.
    intake::spawn_intake(&intake_client, Arc::clone(&scheduler)).await?;
    info!(
        insert = intake::INSERT_SUBJECT,
        remove = intake::REMOVE_SUBJECT,
        "Schedule intake subscribed"
    );

    // 8. Run until Ctrl-C.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;

    pg.close().await;
    info!("stronghold-engine shutdown complete");
    Ok(())
}

/// Load configuration from `$STRONGHOLD_CONFIG` or the default path.
///
/// A missing file means defaults (plus environment overrides).
fn load_config() -> Result<(StrongholdConfig, PathBuf), EngineError> {
    let path = std::env::var("STRONGHOLD_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = StrongholdConfig::from_file(&path)?;
        Ok((config, path))
    } else {
        let mut config = StrongholdConfig::default();
        config.apply_env_overrides();
        Ok((config, path))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Reload the catalog from disk on `SIGHUP`.
#[cfg(unix)]
fn spawn_catalog_reload(catalog: Arc<SharedCatalog>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGHUP handler, catalog reload disabled");
            return;
        }
    };
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            if let Err(e) = catalog.reload() {
                warn!(error = %e, "catalog reload failed, keeping previous catalog");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_catalog_reload(_catalog: Arc<SharedCatalog>) {}
