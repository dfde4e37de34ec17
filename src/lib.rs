//! Orderflow
//!
//! Order and fulfillment lifecycle engine for small storefronts: partial payment
//! plans, abandoned-checkout capture, order assembly and courier parcel tracking.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod clock;
pub mod config;
pub mod courier;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod keyed_lock;
pub mod models;
pub mod rate_limiter;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::courier::CourierProvider;
use crate::events::{Event, EventSender};
use crate::repositories::Repositories;
use crate::services::{
    CourierGateway, LeadCaptureService, LeadCaptureSettings, OrderAssembler, OrderSettings,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub leads: LeadCaptureService,
    pub orders: Arc<OrderAssembler>,
    pub courier: Arc<CourierGateway>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wires every service over the given ports.
    ///
    /// Returns the receiving half of the event channel; the caller decides who drains it.
    pub fn build(
        config: config::AppConfig,
        repositories: Repositories,
        provider: Arc<dyn CourierProvider>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (event_sender, event_receiver) = EventSender::channel(config.event_channel_capacity);

        let leads = LeadCaptureService::new(
            repositories.leads.clone(),
            LeadCaptureSettings::from_config(&config.lead_capture, &config.orders.default_currency),
            clock.clone(),
            event_sender.clone(),
        );
        let orders = OrderAssembler::new(
            repositories.orders.clone(),
            repositories.payment_methods.clone(),
            repositories.coupons.clone(),
            leads.clone(),
            OrderSettings::from(&config.orders),
            clock.clone(),
            event_sender.clone(),
        );
        let courier = CourierGateway::new(
            repositories.orders.clone(),
            repositories.courier_audit.clone(),
            provider,
            clock.clone(),
            event_sender.clone(),
        );

        let state = Self {
            config,
            event_sender,
            leads,
            orders: Arc::new(orders),
            courier: Arc::new(courier),
            started_at: clock.now(),
        };
        (state, event_receiver)
    }
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/leads", handlers::leads::lead_routes())
        .nest(
            "/orders",
            handlers::orders::order_routes().merge(handlers::parcels::parcel_routes()),
        )
}

/// Full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_response_carries_data_and_timestamp() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, Some("ok"));
        let meta = response.meta.unwrap();
        assert!(DateTime::parse_from_rfc3339(&meta.timestamp).is_ok());
    }

    #[test]
    fn error_response_has_no_data() {
        let response = ApiResponse::<()>::error("oops".into());
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("oops"));
    }
}
