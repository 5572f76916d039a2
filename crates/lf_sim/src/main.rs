mod config;
mod metrics;
mod reflectance;
mod synthetic;
mod view;

use crate::config::{Config, Mode};
use clap::Parser;
use metrics::SimMetrics;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Initialization ---
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
    let config = Config::parse();
    tracing::info!(config = ?config, "lf_sim starting with configuration");

    let metrics = Arc::new(SimMetrics::new()?);

    // --- 2. Start Metrics Server ---
    if let Some(addr) = config.metrics_listen_addr {
        let router = metrics.router();
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(addr = %addr, error = %e, "Failed to bind metrics server");
                    return;
                }
            };
            tracing::info!(addr = %addr, "Metrics server started");
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                tracing::error!(error = %e, "Metrics server exited with an error");
            }
        });
    }

    // --- 3. Main Loop ---
    match config.mode {
        Mode::View(args) => view::run(args, &metrics).await?,
        Mode::Reflectance(args) => reflectance::run(args, &metrics).await?,
    }

    tracing::info!("lf_sim shutting down.");
    Ok(())
}
