//! Meshgate Daemon
//!
//! Serves the identity, access control and migration API.

use clap::Parser;
use meshgate_common::{Database, PasswordHasher, RecordStore};
use meshgate_web::{api_router, reconcile_super_admins, AppState, CleanupWorker, StoreServerInfo};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "meshgated")]
#[command(about = "Meshgate daemon - mesh control plane identity and access API")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MESHGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Store directory
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    info!("Meshgate daemon v{}", meshgate_common::VERSION);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| meshgate_common::default_store_path().join("config.toml"));
    let mut config = DaemonConfig::load(&config_path)?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    if cli.write_config {
        config.save(&config_path)?;
        info!("Wrote configuration to {:?}", config_path);
        return Ok(());
    }

    // Ensure store directory exists
    tokio::fs::create_dir_all(&config.store_path).await?;

    let store: Arc<dyn RecordStore> = Arc::new(Database::open(config.db_path())?);

    match reconcile_super_admins(store.as_ref())? {
        Some(username) => info!(user = %username, "Superadmin verified"),
        None => warn!("No superadmin exists yet; create one via /api/users/adm/createsuperadmin"),
    }

    let server_info = Arc::new(StoreServerInfo::new(store.clone(), config.broker.clone()));
    server_info.ensure_traffic_key()?;

    let (queue, worker) = CleanupWorker::new(store.clone(), config.cleanup.queue_capacity);
    let worker_handle = worker.spawn();

    let state = AppState::new(
        store,
        Arc::new(PasswordHasher::new()),
        config.auth.clone(),
        server_info,
        config.hosts.clone(),
        queue,
    );
    let router = api_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!("API listening on http://{}", config.listen);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last queue handle; let the worker drain
    if let Err(e) = worker_handle.await {
        error!("Cleanup worker error: {}", e);
    }

    info!("Daemon shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
