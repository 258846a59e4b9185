//! overmesh-daemon -- per-host agent of the Overmesh overlay.
//!
//! Holds this host's lease and keeps routes to every peer subnet through the
//! local VTEP. Exits non-zero once the controller has been unreachable for
//! longer than the partition tolerance, or rejects the lease outright.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use overmesh_agent::{AgentError, CommandRoutingAdapter, Daemon, DaemonConfig, HttpControllerClient};
use overmesh_observability::{init_observability, LogLevel};
use tracing::{error, info, warn};

/// Overmesh per-host overlay daemon
#[derive(Parser)]
#[command(name = "overmesh-daemon")]
#[command(version, about = "Overmesh per-host overlay daemon")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "OVERMESH_DAEMON_CONFIG")]
    config: Option<PathBuf>,

    /// This host's underlay IPv4 address
    #[arg(long, env = "OVERMESH_UNDERLAY_IP")]
    underlay_ip: Option<String>,

    /// Controller base URL
    #[arg(long, env = "OVERMESH_CONTROLLER_URL")]
    controller_url: Option<String>,

    /// Request a single overlay address instead of a block
    #[arg(long)]
    single_ip: bool,

    /// Release the lease on SIGINT/SIGTERM
    #[arg(long)]
    release_on_shutdown: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(cli: &Cli) -> Result<DaemonConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => DaemonConfig::default(),
    };

    if let Some(ip) = &cli.underlay_ip {
        config.underlay_ip = ip.clone();
    }
    if let Some(url) = &cli.controller_url {
        config.controller_url = url.clone();
    }
    if cli.single_ip {
        config.single_ip_only = true;
    }
    if cli.release_on_shutdown {
        config.release_on_shutdown = true;
    }
    match cli.verbose {
        0 => {}
        1 => config.observability.logging.level = LogLevel::Debug,
        _ => config.observability.logging.level = LogLevel::Trace,
    }

    config.validate().context("Invalid daemon configuration")?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<DaemonConfig> {
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

    info!("Shutdown signal received");
}

async fn run(config: DaemonConfig) -> Result<(), AgentError> {
    let (_guard, metrics) = init_observability(&config.observability)
        .map_err(|e| AgentError::Configuration(e.to_string()))?;

    let client = HttpControllerClient::new(config.controller_url.clone(), config.client_timeout())?;
    info!(
        underlay_ip = %config.underlay_ip,
        controller = %client.base_url(),
        "Starting overmesh daemon"
    );

    Daemon::new(
        config,
        Arc::new(client),
        Arc::new(CommandRoutingAdapter::new()),
        metrics,
    )
    .run(shutdown_signal())
    .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "overmesh daemon stopped");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
