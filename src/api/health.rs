use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::controller::{AppState, Liveness, SchedulerPhase};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the gateway has not answered yet
    status: &'static str,
    phase: SchedulerPhase,
    liveness: Liveness,
    last_success: Option<DateTime<Utc>>,
    timestamp: DateTime<Utc>,
}

/// GET /healthz
///
/// Always 200 while the process runs; a sleeping gateway is not an unhealthy monitor.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.view.snapshot();
    let liveness = view.liveness();
    Json(HealthResponse {
        status: if liveness == Liveness::NeverSucceeded {
            "degraded"
        } else {
            "ok"
        },
        phase: view.poll.phase,
        liveness,
        last_success: view.poll.last_success,
        timestamp: Utc::now(),
    })
}
