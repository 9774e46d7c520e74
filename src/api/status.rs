use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    api::response::ApiResponse,
    controller::{AppState, Liveness, PollStatus},
    domain::SystemInfo,
};

#[derive(Debug, Serialize)]
pub struct MonitorStatus {
    liveness: Liveness,
    #[serde(flatten)]
    poll: PollStatus,
    panel_count: usize,
    total_energy_kwh: f64,
    history_updated: Option<DateTime<Utc>>,
    /// Gateway identity, when the device reports it
    system: Option<SystemInfo>,
    info_updated: Option<DateTime<Utc>>,
}

/// GET /api/v1/status
///
/// Answers in every phase, including before the first successful fetch.
pub async fn get_status(State(state): State<AppState>) -> ApiResponse<MonitorStatus> {
    let view = state.view.snapshot();
    let status = MonitorStatus {
        liveness: view.liveness(),
        poll: view.poll.clone(),
        panel_count: view.panels.len(),
        total_energy_kwh: view.panels.values().map(|p| p.cumulative_energy_kwh).sum(),
        history_updated: view.history_updated,
        system: view.system.clone(),
        info_updated: view.info_updated,
    };
    ApiResponse::from_view(status, &view)
}
