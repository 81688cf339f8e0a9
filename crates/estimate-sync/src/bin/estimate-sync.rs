//! estimate-sync - reconcile Harvest time entries with Linear estimates.
//!
//! # Environment Variables
//!
//! - `HARVEST_ACCESS_TOKEN`, `HARVEST_ACCOUNT_ID` - Harvest credentials (required)
//! - `LINEAR_API_KEY` - Linear API key or OAuth token (required)
//! - `LINEAR_LABEL_OVER`, `LINEAR_LABEL_UNDER`, `LINEAR_LABEL_ON_TRACK` - status label ids (required)
//! - `TRACKED_SERVICE`, `ISSUE_KEY_MARKER`, `AGGREGATION_STRATEGY` - reconciliation scope
//! - `CHECKPOINT_PATH`, `SYNC_INTERVAL_SECS`, `HTTP_PORT` - runtime settings
//!
//! # Examples
//!
//! ```bash
//! # Single pass (cron / Kubernetes CronJob)
//! estimate-sync run
//!
//! # Long-running service, one pass every 10 minutes
//! estimate-sync serve --interval-secs 600
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use estimate_sync::{server, Config, RunDriver};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Reconcile Harvest time entries against Linear issue estimates.
#[derive(Parser)]
#[command(name = "estimate-sync")]
#[command(about = "Reconcile Harvest time entries against Linear issue estimates")]
#[command(version)]
struct Cli {
    /// Checkpoint file holding the watermark (overrides `CHECKPOINT_PATH`)
    #[arg(long, global = true)]
    checkpoint_path: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single reconciliation pass and exit
    Run,

    /// Run passes on a fixed interval and answer health checks
    Serve {
        /// Seconds between passes (overrides `SYNC_INTERVAL_SECS`)
        #[arg(long)]
        interval_secs: Option<u64>,

        /// HTTP port (overrides `HTTP_PORT`)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let fmt_layer = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env().add_directive("estimate_sync=info".parse()?))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(path) = cli.checkpoint_path {
        config.checkpoint_path = path;
    }

    match cli.command {
        Commands::Run => {
            let driver = RunDriver::from_config(&config).context("Failed to build run driver")?;
            let summary = driver.run().await.context("Reconciliation pass failed")?;
            info!(summary = %serde_json::to_string(&summary)?, "Pass complete");
        }

        Commands::Serve {
            interval_secs,
            port,
        } => {
            let every = Duration::from_secs(interval_secs.unwrap_or(config.interval_secs).max(1));
            let port = port.unwrap_or(config.http_port);
            let driver =
                Arc::new(RunDriver::from_config(&config).context("Failed to build run driver")?);

            info!(
                aggregation = %config.aggregation,
                checkpoint = %config.checkpoint_path.display(),
                "Starting estimate-sync service"
            );

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            info!(%addr, "HTTP listener ready");

            let schedule = tokio::spawn(server::run_schedule(driver, every));

            tokio::select! {
                () = async { tokio::signal::ctrl_c().await.ok(); } => {
                    info!("Received SIGINT, shutting down");
                }
                result = axum::serve(listener, server::router()).into_future() => {
                    result.context("HTTP server failed")?;
                    warn!("HTTP server exited");
                }
                result = schedule => {
                    if let Err(e) = result {
                        warn!(error = %e, "Schedule task panicked");
                    }
                    warn!("Schedule task exited");
                }
            }
        }
    }

    Ok(())
}
