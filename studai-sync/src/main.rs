// StudAI sync - keeps the local note cache and the server in step
// Entry point and background task setup

use anyhow::Context;
use studai_sync::app;
use studai_sync::services::{Connectivity, ConnectivityObserver, ConnectivityProbe};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studai_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting StudAI sync");

    let state = app::setup(app::data_dir_from_env())
        .await
        .context("failed to initialize sync layer")?;

    let (probe, signal) = ConnectivityProbe::new(
        state.api.clone(),
        state.settings.probe_interval(),
        Connectivity::from(state.settings.start_online),
    );
    let probe_task = probe.start();
    let observer_task = ConnectivityObserver::spawn(state.sync_service.clone(), signal);

    let status = state.sync_service.sync_status().await;
    tracing::info!(
        "Sync running ({} operations pending), press Ctrl-C to stop",
        status.pending_operations
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    probe_task.abort();
    observer_task.abort();

    let status = state.sync_service.sync_status().await;
    tracing::info!(
        "Shutting down with {} operations pending",
        status.pending_operations
    );

    Ok(())
}
