pub mod backoff;
pub mod failure_log;
pub mod history;
pub mod info;
pub mod scheduler;
pub mod view;

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::Config;
use crate::energy::EnergyLedger;
use crate::hardware::DeviceHandles;
use crate::repo::StateStore;

pub use backoff::RetryPolicy;
pub use failure_log::FailureLog;
pub use history::HistoryPoller;
pub use info::GatewayInfoPoller;
pub use scheduler::Scheduler;
pub use view::{Liveness, MonitorView, PanelView, PollStatus, SchedulerPhase, ViewPublisher};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub view: Arc<ViewPublisher>,
}

impl AppState {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            view: Arc::new(ViewPublisher::new()),
        }
    }
}

/// Start the polling loop, plus the history and gateway info loops when the device has them.
///
/// Both stop when `shutdown` is cancelled; the polling loop saves its state first.
pub fn spawn_monitor_tasks(
    state: &AppState,
    device: DeviceHandles,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    let cfg = &state.cfg;
    let tz = cfg.energy.tz()?;
    let mut tasks = Vec::new();

    let scheduler = Scheduler::new(
        device.fetcher,
        clock.clone(),
        store,
        state.view.clone(),
        EnergyLedger::new(tz),
        cfg.scheduler.clone(),
    )
    .with_fetch_timeout(cfg.device.fetch_timeout())
    .with_persist_interval(cfg.energy.persist_interval());
    tasks.push(tokio::spawn(scheduler.run(shutdown.clone())));

    if let Some(history) = device.history {
        let poller = HistoryPoller::new(
            history,
            clock.clone(),
            state.view.clone(),
            tz,
            cfg.device.history_interval(),
            cfg.scheduler.failure_log_window(),
        )
        .with_fetch_timeout(cfg.device.fetch_timeout());
        tasks.push(tokio::spawn(poller.run(shutdown.clone())));
    }

    if let Some(info) = device.info {
        let poller = GatewayInfoPoller::new(
            info,
            clock,
            state.view.clone(),
            cfg.device.info_interval(),
            cfg.scheduler.failure_log_window(),
        )
        .with_fetch_timeout(cfg.device.fetch_timeout());
        tasks.push(tokio::spawn(poller.run(shutdown)));
    }

    Ok(tasks)
}
