use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::courier::{CourierError, CourierProvider, ParcelRequest};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::keyed_lock::KeyedLocks;
use crate::models::{
    AuditOutcome, CourierAction, CourierAuditEntry, Order, ParcelRecord, ParcelState,
};
use crate::repositories::{CourierAuditLog, OrderRepository};

/// Builds the provider payload for an order.
///
/// The courier collects the full total only for cash-on-delivery orders.
pub fn build_parcel_request(order: &Order, idempotency_key: String) -> ParcelRequest {
    ParcelRequest {
        invoice: order.order_number.clone(),
        recipient_name: order.customer.name.clone(),
        recipient_phone: order.customer.phone.clone(),
        recipient_address: format!("{}, {}", order.customer.address, order.customer.city),
        cod_amount: if order.is_cash_on_delivery() {
            order.total
        } else {
            Decimal::ZERO
        },
        note: order.customer.notes.clone(),
        idempotency_key,
    }
}

/// `parcel-{order_id}` for the first parcel, `-r{n}` appended for the n-th recreate.
pub fn idempotency_key(order_id: Uuid, recreate_generation: usize) -> String {
    if recreate_generation == 0 {
        format!("parcel-{}", order_id)
    } else {
        format!("parcel-{}-r{}", order_id, recreate_generation)
    }
}

/// Service owning the courier sub-state of orders.
///
/// Parcel operations on one order run one at a time, from loading the order until
/// the updated parcel is written back.
pub struct CourierGateway {
    orders: Arc<dyn OrderRepository>,
    audit_log: Arc<dyn CourierAuditLog>,
    provider: Arc<dyn CourierProvider>,
    clock: Arc<dyn Clock>,
    event_sender: EventSender,
    order_locks: KeyedLocks<Uuid>,
}

impl CourierGateway {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        audit_log: Arc<dyn CourierAuditLog>,
        provider: Arc<dyn CourierProvider>,
        clock: Arc<dyn Clock>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            orders,
            audit_log,
            provider,
            clock,
            event_sender,
            order_locks: KeyedLocks::new(),
        }
    }

    async fn load_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Appends an audit entry; a failing audit store never fails the courier call.
    #[allow(clippy::too_many_arguments)]
    async fn audit(
        &self,
        order_id: Uuid,
        action: CourierAction,
        outcome: AuditOutcome,
        http_status: Option<u16>,
        request: Value,
        response: Value,
        error_message: Option<String>,
    ) {
        let entry = CourierAuditEntry {
            id: Uuid::new_v4(),
            order_id,
            action,
            provider: self.provider.name().to_string(),
            outcome,
            http_status,
            request,
            response,
            error: error_message,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.audit_log.append(entry).await {
            error!(order_id = %order_id, error = %e, "Failed to append courier audit entry");
        }
    }

    async fn audit_failure(
        &self,
        order_id: Uuid,
        action: CourierAction,
        request: Value,
        err: &CourierError,
    ) {
        self.audit(
            order_id,
            action,
            AuditOutcome::Failure,
            err.http_status(),
            request,
            err.raw_body(),
            Some(err.to_string()),
        )
        .await;
    }

    /// Creates the first parcel for an order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_parcel(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let _guard = self.order_locks.lock(&order_id).await;
        let order = self.load_order(order_id).await?;
        if order.parcel.state() != ParcelState::None {
            return Err(ServiceError::Conflict(format!(
                "Order {} already has a parcel; use recreate to issue a new one",
                order.order_number
            )));
        }
        self.issue_parcel(order, CourierAction::Create).await
    }

    /// Issues a brand-new parcel regardless of the current state.
    ///
    /// The previous parcel is kept as superseded history; it is not cancelled with
    /// the provider.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn recreate_parcel(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let _guard = self.order_locks.lock(&order_id).await;
        let order = self.load_order(order_id).await?;
        self.issue_parcel(order, CourierAction::Recreate).await
    }

    async fn issue_parcel(
        &self,
        mut order: Order,
        action: CourierAction,
    ) -> Result<Order, ServiceError> {
        let key = idempotency_key(order.id, order.parcel.issued());
        let request = build_parcel_request(&order, key.clone());
        let request_payload = request.audit_payload();

        let response = match self.provider.create_parcel(&request).await {
            Ok(response) => response,
            Err(err) => {
                error!(order_id = %order.id, error = %err, ?action, "Courier parcel request failed");
                self.audit_failure(order.id, action, request_payload, &err)
                    .await;
                return Err(err.into());
            }
        };

        self.audit(
            order.id,
            action,
            AuditOutcome::Success,
            response.http_status,
            request_payload,
            response.raw.clone(),
            None,
        )
        .await;

        let now = self.clock.now();
        let created = response.data;
        let consignment_id = created.consignment_id.clone();
        order.parcel.replace(
            ParcelRecord {
                provider: self.provider.name().to_string(),
                consignment_id: created.consignment_id,
                tracking_id: created.tracking_code,
                state: ParcelState::Created,
                provider_status: created.status,
                idempotency_key: key,
                created_at: now,
                updated_at: now,
            },
            now,
        );
        order.updated_at = now;
        let order = self.orders.update(order).await?;

        info!(
            order_id = %order.id,
            consignment_id = %consignment_id,
            recreated = action == CourierAction::Recreate,
            "Parcel created"
        );
        self.event_sender.publish(Event::ParcelCreated {
            order_id: order.id,
            consignment_id,
            recreated: action == CourierAction::Recreate,
        });
        Ok(order)
    }

    /// Queries the provider for the live parcel and records the mapped state.
    ///
    /// A parcel already delivered, cancelled or failed is returned as stored without
    /// asking the provider.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn track_parcel(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let _guard = self.order_locks.lock(&order_id).await;
        let mut order = self.load_order(order_id).await?;
        let Some(consignment_id) = order.parcel.consignment_id().map(str::to_string) else {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} has no parcel to track",
                order.order_number
            )));
        };
        if order.parcel.state().is_terminal() {
            debug!(state = %order.parcel.state(), "Parcel is final; skipping status poll");
            return Ok(order);
        }
        let request_payload = serde_json::json!({ "consignment_id": consignment_id });

        let response = match self.provider.parcel_status(&consignment_id).await {
            Ok(response) => response,
            Err(err) => {
                error!(order_id = %order_id, error = %err, "Courier status request failed");
                self.audit_failure(order_id, CourierAction::Track, request_payload, &err)
                    .await;
                return Err(err.into());
            }
        };

        self.audit(
            order_id,
            CourierAction::Track,
            AuditOutcome::Success,
            response.http_status,
            request_payload,
            response.raw.clone(),
            None,
        )
        .await;

        let reported = response.data.delivery_status;
        let new_state = ParcelState::from_provider_status(&reported).unwrap_or_else(|| {
            warn!(status = %reported, "Unknown courier status; treating as pending");
            ParcelState::Pending
        });

        let now = self.clock.now();
        let old_state = order.parcel.state();
        if let Some(current) = order.parcel.current.as_mut() {
            current.state = new_state;
            current.provider_status = Some(reported);
            current.updated_at = now;
        }
        order.updated_at = now;
        let order = self.orders.update(order).await?;

        if old_state != new_state {
            info!(order_id = %order_id, %old_state, %new_state, "Parcel status changed");
            self.event_sender.publish(Event::ParcelStatusChanged {
                order_id,
                old_status: old_state,
                new_status: new_state,
            });
        }
        Ok(order)
    }

    pub async fn audit_log(&self, order_id: Uuid) -> Result<Vec<CourierAuditEntry>, ServiceError> {
        self.audit_log.entries_for_order(order_id).await
    }
}
