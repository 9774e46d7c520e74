use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::controller::{Liveness, MonitorView};

/// Envelope for every successful API answer
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    /// Set when the values come from an earlier cycle because the latest one failed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    /// When the data was last refreshed from the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            stale: false,
            updated_at: None,
        }
    }

    /// Carry staleness and refresh time of the view the data was read from
    pub fn from_view(data: T, view: &MonitorView) -> Self {
        Self {
            success: true,
            data,
            stale: view.liveness() == Liveness::Stale,
            updated_at: view.poll.last_success,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
