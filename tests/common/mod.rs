#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use orderflow::{
    clock::ManualClock,
    config::AppConfig,
    courier::{
        CourierError, CourierProvider, CreatedParcel, ParcelRequest, ParcelStatusReport,
        ProviderResponse,
    },
    events::Event,
    models::PaymentMethodRule,
    repositories::{
        InMemoryCouponRepository, InMemoryCourierAuditLog, InMemoryLeadRepository,
        InMemoryOrderRepository, InMemoryPaymentMethodRepository, Repositories,
    },
    services::{OrderItemInput, PlaceOrderInput},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Scripted courier: answers come from queues, every call is recorded.
#[derive(Default)]
pub struct RecordingCourierProvider {
    pub created: Mutex<Vec<ParcelRequest>>,
    pub tracked: Mutex<Vec<String>>,
    create_failures: Mutex<VecDeque<CourierError>>,
    statuses: Mutex<VecDeque<String>>,
    next_consignment: Mutex<u32>,
    latency: Mutex<Option<Duration>>,
}

impl RecordingCourierProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self, err: CourierError) {
        self.create_failures.lock().unwrap().push_back(err);
    }

    pub fn push_status(&self, status: &str) {
        self.statuses.lock().unwrap().push_back(status.to_string());
    }

    /// Every later provider call waits `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn create_calls(&self) -> Vec<ParcelRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn track_calls(&self) -> Vec<String> {
        self.tracked.lock().unwrap().clone()
    }
}

#[async_trait]
impl CourierProvider for RecordingCourierProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create_parcel(
        &self,
        request: &ParcelRequest,
    ) -> Result<ProviderResponse<CreatedParcel>, CourierError> {
        self.wait().await;
        self.created.lock().unwrap().push(request.clone());
        if let Some(err) = self.create_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let consignment_id = {
            let mut next = self.next_consignment.lock().unwrap();
            *next += 1;
            format!("CN-{}", *next)
        };
        let raw = json!({
            "status": 200,
            "consignment": {
                "consignment_id": consignment_id,
                "tracking_code": format!("TRK-{}", consignment_id),
                "status": "in_review"
            }
        });
        Ok(ProviderResponse {
            http_status: Some(200),
            raw,
            data: CreatedParcel {
                tracking_code: Some(format!("TRK-{}", consignment_id)),
                consignment_id,
                status: Some("in_review".to_string()),
            },
        })
    }

    async fn parcel_status(
        &self,
        consignment_id: &str,
    ) -> Result<ProviderResponse<ParcelStatusReport>, CourierError> {
        self.wait().await;
        self.tracked.lock().unwrap().push(consignment_id.to_string());
        let delivery_status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "pending".to_string());
        Ok(ProviderResponse {
            http_status: Some(200),
            raw: json!({ "status": 200, "delivery_status": delivery_status }),
            data: ParcelStatusReport { delivery_status },
        })
    }
}

/// Application wired over in-memory ports, a manual clock and a recording courier.
pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub courier: Arc<RecordingCourierProvider>,
    pub leads: Arc<InMemoryLeadRepository>,
    pub orders: Arc<InMemoryOrderRepository>,
    pub coupons: Arc<InMemoryCouponRepository>,
    pub payment_methods: Arc<InMemoryPaymentMethodRepository>,
    pub audit: Arc<InMemoryCourierAuditLog>,
    pub events: mpsc::Receiver<Event>,
}

pub fn cod_rule() -> PaymentMethodRule {
    PaymentMethodRule::new("cod", "Cash on delivery")
        .cash_on_delivery()
        .with_delivery_charge_advance()
}

pub fn prepaid_rule() -> PaymentMethodRule {
    PaymentMethodRule::new("online", "Online payment").requiring_transaction_id()
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
        ));
        let courier = Arc::new(RecordingCourierProvider::new());
        let leads = Arc::new(InMemoryLeadRepository::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let coupons = Arc::new(InMemoryCouponRepository::new());
        let audit = Arc::new(InMemoryCourierAuditLog::new());
        let payment_methods = Arc::new(InMemoryPaymentMethodRepository::with_rules(vec![
            cod_rule(),
            prepaid_rule(),
        ]));

        let repositories = Repositories {
            leads: leads.clone(),
            orders: orders.clone(),
            payment_methods: payment_methods.clone(),
            coupons: coupons.clone(),
            courier_audit: audit.clone(),
        };
        let (state, events) =
            AppState::build(config, repositories, courier.clone(), clock.clone());

        Self {
            state,
            clock,
            courier,
            leads,
            orders,
            coupons,
            payment_methods,
            audit,
            events,
        }
    }

    pub fn router(&self) -> Router {
        orderflow::app(self.state.clone())
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Drains events published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn order_input(payment_method: &str) -> PlaceOrderInput {
    PlaceOrderInput {
        customer_name: "Rahim Uddin".into(),
        customer_phone: "01711000000".into(),
        customer_email: None,
        address: "House 4, Road 7".into(),
        city: "Dhaka".into(),
        notes: Some("Call before delivery".into()),
        items: vec![
            OrderItemInput {
                product_id: "p-1".into(),
                name: "Kurta".into(),
                image: None,
                quantity: 2,
                unit_price: Decimal::from(250),
                variant_id: Some("v-red-m".into()),
                variant_snapshot: Some(json!({"color": "red", "size": "M"})),
            },
            OrderItemInput {
                product_id: "p-2".into(),
                name: "Scarf".into(),
                image: None,
                quantity: 1,
                unit_price: Decimal::from(500),
                variant_id: None,
                variant_snapshot: None,
            },
        ],
        shipping_cost: Decimal::from(60),
        discount: Decimal::ZERO,
        payment_method: payment_method.into(),
        transaction_id: None,
        coupon_code: None,
        currency: None,
        lead_session: None,
    }
}
