use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::{ApiResponse, ApiResult, AppState};

/// Liveness report
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub timestamp: String,
    pub uptime_secs: i64,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let now = chrono::Utc::now();
    Ok(Json(ApiResponse::success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        timestamp: now.to_rfc3339(),
        uptime_secs: (now - state.started_at).num_seconds().max(0),
    })))
}
