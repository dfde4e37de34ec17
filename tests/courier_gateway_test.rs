mod common;

use assert_matches::assert_matches;
use common::{order_input, TestApp};
use orderflow::{
    courier::CourierError,
    errors::ServiceError,
    events::Event,
    models::{AuditOutcome, CourierAction, ParcelState},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::time::Duration;

async fn placed_order(app: &TestApp, payment_method: &str) -> orderflow::models::Order {
    let mut input = order_input(payment_method);
    if payment_method == "online" {
        input.transaction_id = Some("TX-1".into());
    }
    app.state.orders.place_order(input).await.unwrap()
}

#[tokio::test]
async fn cash_on_delivery_parcel_collects_the_full_total() {
    let mut app = TestApp::new();
    let mut input = order_input("cod");
    input.items.truncate(1);
    input.items[0].quantity = 3;
    input.shipping_cost = Decimal::ZERO;
    let order = app.state.orders.place_order(input).await.unwrap();
    assert_eq!(order.total, dec!(750));

    let updated = app.state.courier.create_parcel(order.id).await.unwrap();

    let calls = app.courier.create_calls();
    assert_eq!(calls.len(), 1);
    let request = &calls[0];
    assert_eq!(request.cod_amount, dec!(750));
    assert_eq!(request.invoice, order.order_number);
    assert_eq!(request.recipient_address, "House 4, Road 7, Dhaka");
    assert_eq!(request.recipient_phone, "01711000000");
    assert_eq!(request.note.as_deref(), Some("Call before delivery"));
    assert_eq!(request.idempotency_key, format!("parcel-{}", order.id));

    assert_eq!(updated.parcel.state(), ParcelState::Created);
    let parcel = updated.parcel.current.as_ref().unwrap();
    assert_eq!(parcel.consignment_id, "CN-1");
    assert_eq!(parcel.tracking_id.as_deref(), Some("TRK-CN-1"));
    assert_eq!(parcel.provider, "recording");

    assert!(app.drain_events().contains(&Event::ParcelCreated {
        order_id: order.id,
        consignment_id: "CN-1".into(),
        recreated: false,
    }));
}

#[tokio::test]
async fn prepaid_parcel_collects_nothing() {
    let app = TestApp::new();
    let order = placed_order(&app, "online").await;

    app.state.courier.create_parcel(order.id).await.unwrap();
    assert_eq!(app.courier.create_calls()[0].cod_amount, Decimal::ZERO);
}

#[tokio::test]
async fn second_create_points_to_recreate() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;

    app.state.courier.create_parcel(order.id).await.unwrap();
    let err = app.state.courier.create_parcel(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(msg) if msg.contains("recreate"));
    assert_eq!(app.courier.create_calls().len(), 1);
}

#[tokio::test]
async fn recreate_issues_a_new_parcel_without_cancelling_the_old_one() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;

    app.state.courier.create_parcel(order.id).await.unwrap();
    let recreated = app.state.courier.recreate_parcel(order.id).await.unwrap();

    assert_eq!(recreated.parcel.consignment_id(), Some("CN-2"));
    assert_eq!(recreated.parcel.state(), ParcelState::Created);
    assert_eq!(recreated.parcel.superseded.len(), 1);
    assert_eq!(recreated.parcel.superseded[0].consignment_id, "CN-1");
    assert_eq!(recreated.parcel.superseded[0].state, ParcelState::Superseded);

    // The provider only ever saw two creates, each with its own idempotency key
    let calls = app.courier.create_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].idempotency_key, format!("parcel-{}-r1", order.id));
    assert!(app.courier.track_calls().is_empty());

    let log = app.state.courier.audit_log(order.id).await.unwrap();
    let actions: Vec<_> = log.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![CourierAction::Create, CourierAction::Recreate]);
}

#[tokio::test]
async fn tracking_maps_provider_vocabulary() {
    let mut app = TestApp::new();
    let order = placed_order(&app, "cod").await;
    app.state.courier.create_parcel(order.id).await.unwrap();
    app.drain_events();

    app.courier.push_status("in_review");
    app.courier.push_status("delivered_approval_pending");
    app.courier.push_status("picked");
    app.courier.push_status("delivered");

    let tracked = app.state.courier.track_parcel(order.id).await.unwrap();
    assert_eq!(tracked.parcel.state(), ParcelState::Pending);
    let tracked = app.state.courier.track_parcel(order.id).await.unwrap();
    assert_eq!(tracked.parcel.state(), ParcelState::Pending);
    let tracked = app.state.courier.track_parcel(order.id).await.unwrap();
    assert_eq!(tracked.parcel.state(), ParcelState::InTransit);
    let tracked = app.state.courier.track_parcel(order.id).await.unwrap();
    assert_eq!(tracked.parcel.state(), ParcelState::Delivered);
    assert_eq!(
        tracked.parcel.current.as_ref().unwrap().provider_status.as_deref(),
        Some("delivered")
    );

    let changes: Vec<_> = app
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::ParcelStatusChanged { .. }))
        .collect();
    assert_eq!(changes.len(), 3);
    assert_eq!(app.courier.track_calls(), vec!["CN-1"; 4]);
}

#[tokio::test]
async fn unknown_provider_status_counts_as_pending() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;
    app.state.courier.create_parcel(order.id).await.unwrap();

    app.courier.push_status("warehouse_shuffle");
    let tracked = app.state.courier.track_parcel(order.id).await.unwrap();
    assert_eq!(tracked.parcel.state(), ParcelState::Pending);
}

#[tokio::test]
async fn tracking_without_a_parcel_is_invalid() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;

    let err = app.state.courier.track_parcel(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    assert!(app.courier.track_calls().is_empty());
}

#[tokio::test]
async fn provider_failure_is_surfaced_and_audited() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;
    app.courier.fail_next_create(CourierError::Rejected {
        http_status: Some(422),
        message: "Invalid recipient phone".into(),
        raw: json!({"status": 400, "message": "Invalid recipient phone"}),
    });

    let err = app.state.courier.create_parcel(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(msg) if msg.contains("Invalid recipient phone"));

    let stored = app.state.orders.get_order(order.id).await.unwrap();
    assert_eq!(stored.parcel.state(), ParcelState::None);

    let log = app.state.courier.audit_log(order.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, AuditOutcome::Failure);
    assert_eq!(log[0].http_status, Some(422));
    assert_eq!(log[0].response["message"], "Invalid recipient phone");
    assert_eq!(
        log[0].request["idempotency_key"],
        format!("parcel-{}", order.id)
    );

    // Create stays available after a failure
    let created = app.state.courier.create_parcel(order.id).await.unwrap();
    assert_eq!(created.parcel.state(), ParcelState::Created);
    assert_eq!(app.audit.len().await, 2);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new();
    let err = app
        .state
        .courier
        .create_parcel(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn concurrent_creates_issue_one_parcel() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;
    app.courier.set_latency(Duration::from_millis(50));

    let (first, second) = tokio::join!(
        app.state.courier.create_parcel(order.id),
        app.state.courier.create_parcel(order.id)
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ServiceError::Conflict(_)))));
    assert_eq!(app.courier.create_calls().len(), 1);

    let stored = app.state.orders.get_order(order.id).await.unwrap();
    assert_eq!(stored.parcel.consignment_id(), Some("CN-1"));
    assert!(stored.parcel.superseded.is_empty());
}

#[tokio::test]
async fn recreate_during_a_slow_track_is_kept() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;
    app.state.courier.create_parcel(order.id).await.unwrap();

    app.courier.set_latency(Duration::from_millis(200));
    app.courier.push_status("in_transit");
    let courier = app.state.courier.clone();
    let order_id = order.id;
    let track = tokio::spawn(async move { courier.track_parcel(order_id).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let recreated = app.state.courier.recreate_parcel(order.id).await.unwrap();
    assert_eq!(recreated.parcel.consignment_id(), Some("CN-2"));
    track.await.unwrap().unwrap();

    let stored = app.state.orders.get_order(order.id).await.unwrap();
    assert_eq!(stored.parcel.consignment_id(), Some("CN-2"));
    assert_eq!(stored.parcel.state(), ParcelState::Created);
    assert_eq!(stored.parcel.superseded.len(), 1);
    assert_eq!(stored.parcel.superseded[0].consignment_id, "CN-1");
    assert_eq!(stored.parcel.superseded[0].state, ParcelState::Superseded);
}

#[tokio::test]
async fn tracking_a_delivered_parcel_skips_the_provider() {
    let app = TestApp::new();
    let order = placed_order(&app, "cod").await;
    app.state.courier.create_parcel(order.id).await.unwrap();

    app.courier.push_status("delivered");
    app.state.courier.track_parcel(order.id).await.unwrap();
    let again = app.state.courier.track_parcel(order.id).await.unwrap();

    assert_eq!(again.parcel.state(), ParcelState::Delivered);
    assert_eq!(app.courier.track_calls(), vec!["CN-1"]);
}
