//! orbitald — the Orbital autoscaling daemon.
//!
//! Single binary that assembles:
//! - State store (redb) holding workloads and metric readings
//! - Autoscaler control loop scaling workloads from those readings
//! - Reading retention sweep
//! - REST API with status and Prometheus endpoints
//!
//! # Usage
//!
//! ```text
//! orbitald run --config /etc/orbital/orbital.toml
//! orbitald run --listen 127.0.0.1:8480 --data-dir ./data --interval 10
//! orbitald check-config --config /etc/orbital/orbital.toml
//! ```

mod adapters;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use orbital_autoscale::{Autoscaler, epoch_secs};
use orbital_state::StateStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{StoreCapacity, StoreMetrics};
use crate::config::{DaemonConfig, LogFormat, ServerConfig};

/// Readings older than this many metric windows are pruned.
const RETENTION_WINDOWS: u32 = 10;

#[derive(Parser)]
#[command(name = "orbitald", about = "Orbital autoscaling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and the autoscaler control loop.
    Run {
        /// Path to orbital.toml. Defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to listen on, overriding the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Data directory for persistent state, overriding the config file.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Autoscaler evaluation interval in seconds.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Validate a config file and print the effective configuration.
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            listen,
            data_dir,
            interval,
        } => {
            let mut config = DaemonConfig::load(config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            if let Some(secs) = interval {
                config.set_interval(Duration::from_secs(secs));
            }
            config.validate()?;

            init_tracing(&config.server);
            run(config).await
        }
        Command::CheckConfig { config } => {
            let config = DaemonConfig::load(config.as_deref())?;
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    match server.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("Orbital daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("orbital.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let autoscale = config.autoscale.clone();
    let autoscaler = Arc::new(Autoscaler::new(
        Arc::new(StoreCapacity::new(store.clone())),
        Arc::new(StoreMetrics::new(store.clone())),
        config.autoscale,
    )?);
    info!(
        interval_secs = autoscale.interval.as_secs(),
        workers = autoscale.workers,
        "autoscaler initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let autoscale_handle = tokio::spawn({
        let autoscaler = autoscaler.clone();
        let shutdown = shutdown_rx.clone();
        async move { autoscaler.run(shutdown).await }
    });

    let prune_handle = tokio::spawn(prune_readings(
        store.clone(),
        autoscale.interval,
        autoscale.metric_window * RETENTION_WINDOWS,
        shutdown_rx,
    ));

    // ── Start API server ───────────────────────────────────────

    let router = orbital_api::build_router(store, autoscaler.status());
    let addr = config.server.listen;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = autoscale_handle.await;
    let _ = prune_handle.await;

    info!("Orbital daemon stopped");
    Ok(())
}

/// Delete readings that have aged out of every query window.
async fn prune_readings(
    store: StateStore,
    every: Duration,
    retention: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let before = epoch_secs().saturating_sub(retention.as_secs());
                match store.prune_readings(before) {
                    Ok(0) => {}
                    Ok(pruned) => debug!(pruned, before, "pruned metric readings"),
                    Err(e) => warn!(error = %e, "reading pruning failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("reading pruner shutting down");
                break;
            }
        }
    }
}
