use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{post, put},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::{models::LeadInput, services::LeadSaveOutcome, ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct LeadSession {
    pub token: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct SaveLeadQuery {
    /// Bypass the save throttle
    #[serde(default)]
    pub force: bool,
    /// Coalesce with other saves arriving within the quiet period
    #[serde(default)]
    pub debounce: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveLeadResponse {
    Scheduled,
    Saved { result: LeadSaveOutcome },
}

pub fn lead_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/:token", put(save_lead).delete(close_session))
        .route("/sessions/:token/flush", post(flush_lead))
}

pub async fn open_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse<LeadSession>>), crate::errors::ServiceError> {
    let token = state.leads.open_session();
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(LeadSession { token })),
    ))
}

/// Lead saves never fail the request; the outcome is reported in the body.
pub async fn save_lead(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<SaveLeadQuery>,
    Json(input): Json<LeadInput>,
) -> ApiResult<SaveLeadResponse> {
    if query.debounce && !query.force {
        state.leads.debounced_save(&token, input);
        return Ok(Json(ApiResponse::success(SaveLeadResponse::Scheduled)));
    }
    let result = state.leads.save(&token, input, query.force).await;
    Ok(Json(ApiResponse::success(SaveLeadResponse::Saved { result })))
}

pub async fn flush_lead(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<LeadSaveOutcome> {
    Ok(Json(ApiResponse::success(state.leads.flush(&token).await)))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<bool> {
    Ok(Json(ApiResponse::success(state.leads.close_session(&token))))
}
