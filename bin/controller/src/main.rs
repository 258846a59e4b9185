//! overmesh-controller -- subnet lease authority for the Overmesh overlay.
//!
//! Hands out overlay subnets to hosts over HTTP, persists them in SQLite and
//! reports pool usage as Prometheus gauges.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use overmesh_controller::{
    build_router, ApiServer, ControllerConfig, LeaseController, SqliteLeaseStore, UsageReporter,
};
use overmesh_lease::CidrPool;
use overmesh_observability::{init_observability, LogLevel};
use tracing::{info, warn};

/// Overmesh subnet lease controller
#[derive(Parser)]
#[command(name = "overmesh-controller")]
#[command(version, about = "Overmesh subnet lease controller")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "OVERMESH_CONTROLLER_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long, env = "OVERMESH_LISTEN_ADDR")]
    listen_addr: Option<SocketAddr>,

    /// SQLite database file or directory
    #[arg(long, env = "OVERMESH_DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// Overlay network range (e.g. 10.255.0.0/16)
    #[arg(long)]
    network: Option<String>,

    /// Serve Swagger UI
    #[arg(long)]
    swagger: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(cli: &Cli) -> Result<ControllerConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ControllerConfig::default(),
    };

    if let Some(addr) = cli.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(path) = &cli.database_path {
        config.database_path = path.clone();
    }
    if let Some(network) = &cli.network {
        config.network = network.clone();
    }
    if cli.swagger {
        config.swagger_enabled = true;
    }
    match cli.verbose {
        0 => {}
        1 => config.observability.logging.level = LogLevel::Debug,
        _ => config.observability.logging.level = LogLevel::Trace,
    }

    config.validate().context("Invalid controller configuration")?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<ControllerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let (_guard, metrics) =
        init_observability(&config.observability).context("Failed to initialize observability")?;

    let store = SqliteLeaseStore::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let pool = CidrPool::new(
        &config.network,
        config.subnet_prefix_length,
        config.single_ip_blocks,
    )
    .context("Failed to build the subnet pool")?;

    info!(
        network = %config.network,
        subnet_prefix_length = config.subnet_prefix_length,
        blocks = pool.block_pool_size(),
        single_ips = pool.single_pool_size(),
        "Subnet pool ready"
    );

    let controller = Arc::new(
        LeaseController::new(Arc::new(store), Arc::new(pool))
            .with_lease_expiration(config.lease_expiration_seconds)
            .with_max_acquire_attempts(config.max_acquire_attempts),
    );

    let reporter = Arc::new(UsageReporter::new(
        controller.clone(),
        metrics.clone(),
        Duration::from_secs(config.metrics_emit_interval_seconds),
    ));
    let reporter_task = tokio::spawn({
        let reporter = reporter.clone();
        async move { reporter.run_loop().await }
    });

    let router = build_router(controller, metrics, config.swagger_enabled);
    let result = ApiServer::new(config.listen_addr, router)
        .run_with_shutdown(shutdown_signal())
        .await;

    reporter.shutdown();
    let _ = reporter_task.await;

    result
}
