use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError, models::Order, services::PlaceOrderInput, ApiResponse, ApiResult,
    AppState,
};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order))
        .route("/:id", get(get_order))
        .route("/by-number/:number", get(get_order_by_number))
}

pub async fn place_order(
    State(state): State<AppState>,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ServiceError> {
    let order = state.orders.place_order(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(order, "Order placed")),
    ))
}

pub async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Order> {
    let order = state.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn get_order_by_number(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> ApiResult<Order> {
    let order = state.orders.get_order_by_number(&number).await?;
    Ok(Json(ApiResponse::success(order)))
}
