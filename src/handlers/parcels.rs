use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    models::{CourierAuditEntry, CourierParcel},
    ApiResponse, ApiResult, AppState,
};

pub fn parcel_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/parcel", post(create_parcel))
        .route("/:id/parcel/recreate", post(recreate_parcel))
        .route("/:id/parcel/track", post(track_parcel))
        .route("/:id/parcel/logs", get(parcel_logs))
}

pub async fn create_parcel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CourierParcel> {
    let order = state.courier.create_parcel(id).await?;
    Ok(Json(ApiResponse::with_message(order.parcel, "Parcel created")))
}

pub async fn recreate_parcel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CourierParcel> {
    let order = state.courier.recreate_parcel(id).await?;
    Ok(Json(ApiResponse::with_message(order.parcel, "Parcel recreated")))
}

pub async fn track_parcel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CourierParcel> {
    let order = state.courier.track_parcel(id).await?;
    Ok(Json(ApiResponse::success(order.parcel)))
}

pub async fn parcel_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<CourierAuditEntry>> {
    let entries = state.courier.audit_log(id).await?;
    Ok(Json(ApiResponse::success(entries)))
}
