//! sekisyo license keeper daemon
//!
//! Registers the configured plugins, serves the administrative license API
//! and re-checks valid licenses on a fixed interval.
//!
//! Usage:
//!   sekisyo-server --config sekisyo.toml

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::Parser;
use sekisyo_license::{LicenseEvent, RevalidationScheduler};
use sekisyo_server::{build_registry, build_router, AppState, ServerConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "sekisyo-server")]
#[command(about = "Plugin license keeper and admin API")]
struct Args {
    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if config.admin_token.is_empty() {
        warn!("admin_token is empty; every admin request will be rejected");
    }

    info!("sekisyo starting...");
    let registry = build_registry(&config)?;

    let scheduler = Arc::new(RevalidationScheduler::from_config(
        Arc::clone(&registry),
        &config.keeper,
    ));
    tokio::spawn(log_events(scheduler.subscribe()));
    let sweeps = scheduler.start();

    let app = build_router(Arc::new(AppState::new(
        Arc::clone(&registry),
        config.admin_token.clone(),
    )));
    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!("Admin API listening on {}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    sweeps.stop().await;
    info!("sekisyo stopped");
    Ok(())
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<LicenseEvent>) {
    loop {
        match events.recv().await {
            Ok(LicenseEvent::FailureReported {
                plugin_id,
                consecutive_failures,
                record,
            }) => {
                info!(
                    "Health check for {}: {} consecutive failure(s), tolerance {}",
                    plugin_id,
                    consecutive_failures,
                    record.failure_tolerance()
                );
            }
            Ok(LicenseEvent::Deactivated {
                plugin_id,
                consecutive_failures,
            }) => {
                warn!(
                    "Plugin {} deactivated after {} consecutive failure(s)",
                    plugin_id, consecutive_failures
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Dropped {} license event(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
