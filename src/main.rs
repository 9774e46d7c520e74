use anyhow::{Context, Result};
use panel_energy_monitor::{
    api,
    clock::{Clock, SystemClock},
    config::Config,
    controller::{self, AppState},
    hardware::build_device,
    repo::JsonFileStore,
    telemetry,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.logging);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = JsonFileStore::open(&cfg.energy.state_file)
        .await
        .context("failed to open energy state")?;
    let device = build_device(&cfg, clock.clone())?;

    let state = AppState::new(cfg.clone());
    let shutdown = CancellationToken::new();
    let tasks = controller::spawn_monitor_tasks(
        &state,
        device,
        Arc::new(store),
        clock,
        shutdown.clone(),
    )?;

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("binding to 0.0.0.0, the API is reachable from the network");
    }
    info!(%addr, "starting panel energy monitor");

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            telemetry::shutdown_signal().await;
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "monitor task ended abnormally");
        }
    }

    info!("shutdown complete");
    Ok(())
}
