use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    api::{error::ApiError, response::ApiResponse, status},
    controller::{AppState, Liveness, MonitorView, PanelView},
    domain::{GatewayLayout, PanelLayout, PeriodKind},
    energy::{HistorySummary, PeriodEnergy},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/panels", get(list_panels))
        .route("/panels/:id", get(get_panel))
        .route("/panels/:id/energy/:period", get(get_panel_energy))
        .route("/history", get(get_history))
        .route("/layout", get(get_layout))
}

#[derive(Debug, Serialize)]
pub struct PanelEntry {
    id: String,
    /// Own liveness: a panel missing from the latest snapshot is stale on its own
    liveness: Liveness,
    #[serde(flatten)]
    panel: PanelView,
    layout: Option<PanelLayout>,
}

impl PanelEntry {
    fn from_view(view: &MonitorView, id: &str, panel: &PanelView) -> Self {
        Self {
            id: id.to_string(),
            liveness: view.panel_liveness(id).unwrap_or(Liveness::NeverSucceeded),
            panel: panel.clone(),
            layout: view.layout.as_ref().and_then(|l| l.panel(id)).cloned(),
        }
    }
}

/// Readings are only served once the gateway has answered at least once
fn live_view(state: &AppState) -> Result<Arc<MonitorView>, ApiError> {
    let view = state.view.snapshot();
    if view.liveness() == Liveness::NeverSucceeded {
        return Err(ApiError::ServiceUnavailable(
            "no data received from the gateway yet".to_string(),
        ));
    }
    Ok(view)
}

/// GET /api/v1/panels
pub async fn list_panels(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<PanelEntry>>, ApiError> {
    let view = live_view(&state)?;
    let panels = view
        .panels
        .iter()
        .map(|(id, panel)| PanelEntry::from_view(&view, id, panel))
        .collect();
    Ok(ApiResponse::from_view(panels, &view))
}

/// GET /api/v1/panels/:id
pub async fn get_panel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<PanelEntry>, ApiError> {
    let view = live_view(&state)?;
    let panel = view
        .panels
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("panel {id}")))?;
    let entry = PanelEntry::from_view(&view, &id, panel);
    let stale = entry.liveness == Liveness::Stale;
    let mut response = ApiResponse::from_view(entry, &view);
    response.stale = stale;
    Ok(response)
}

/// GET /api/v1/panels/:id/energy/:period
pub async fn get_panel_energy(
    State(state): State<AppState>,
    Path((id, period)): Path<(String, String)>,
) -> Result<ApiResponse<PeriodEnergy>, ApiError> {
    let kind: PeriodKind = period
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown period {period:?}, expected day or month")))?;
    let view = live_view(&state)?;
    let energy = view
        .period_energy(&id, kind)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("panel {id}")))?;
    Ok(ApiResponse::from_view(energy, &view))
}

/// GET /api/v1/history
pub async fn get_history(State(state): State<AppState>) -> Result<ApiResponse<HistorySummary>, ApiError> {
    let view = state.view.snapshot();
    let history = view
        .history
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("no production history available".to_string()))?;
    let mut response = ApiResponse::success(history);
    response.updated_at = view.history_updated;
    Ok(response)
}

/// GET /api/v1/layout
pub async fn get_layout(State(state): State<AppState>) -> Result<ApiResponse<GatewayLayout>, ApiError> {
    let view = state.view.snapshot();
    let layout = view
        .layout
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("gateway layout not loaded yet".to_string()))?;
    let mut response = ApiResponse::success(layout);
    response.updated_at = view.info_updated;
    Ok(response)
}
