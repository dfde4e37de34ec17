use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::config::OrdersConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{CustomerDetails, Order, OrderItem};
use crate::repositories::{CouponRepository, OrderRepository, PaymentMethodRepository};
use crate::services::leads::LeadCaptureService;
use crate::services::payment_plan;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemInput {
    #[validate(length(min = 1, message = "Product id is required"))]
    pub product_id: String,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub variant_snapshot: Option<serde_json::Value>,
}

/// Checkout submission.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlaceOrderInput {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(length(min = 5, message = "Customer phone is required"))]
    pub customer_phone: String,
    #[validate(email)]
    #[serde(default)]
    pub customer_email: Option<String>,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<OrderItemInput>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Lead session token to convert once the order exists
    #[serde(default)]
    pub lead_session: Option<String>,
}

impl PlaceOrderInput {
    /// Checks the validator derive cannot express.
    fn check(&self) -> Result<(), ServiceError> {
        for (field, value) in [
            ("customer_name", &self.customer_name),
            ("customer_phone", &self.customer_phone),
            ("address", &self.address),
            ("city", &self.city),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::ValidationError(format!("{} is required", field)));
            }
        }
        for item in &self.items {
            item.validate()?;
            if item.unit_price.is_sign_negative() {
                return Err(ServiceError::ValidationError(format!(
                    "Price of {} cannot be negative",
                    item.product_id
                )));
            }
        }
        if self.shipping_cost.is_sign_negative() || self.discount.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "Shipping cost and discount cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub number_prefix: String,
    pub max_number_attempts: u32,
    pub default_currency: String,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            number_prefix: "ORD".to_string(),
            max_number_attempts: 5,
            default_currency: "BDT".to_string(),
        }
    }
}

impl From<&OrdersConfig> for OrderSettings {
    fn from(config: &OrdersConfig) -> Self {
        Self {
            number_prefix: config.number_prefix.clone(),
            max_number_attempts: config.max_number_attempts,
            default_currency: config.default_currency.clone(),
        }
    }
}

/// `{prefix}{yyMMddHHmmss}{3 random digits}`
pub fn generate_order_number(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("{}{}{:03}", prefix, at.format("%y%m%d%H%M%S"), suffix)
}

/// Turns a validated checkout into a persisted order.
pub struct OrderAssembler {
    orders: Arc<dyn OrderRepository>,
    payment_methods: Arc<dyn PaymentMethodRepository>,
    coupons: Arc<dyn CouponRepository>,
    leads: LeadCaptureService,
    settings: OrderSettings,
    clock: Arc<dyn Clock>,
    event_sender: EventSender,
}

impl OrderAssembler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        payment_methods: Arc<dyn PaymentMethodRepository>,
        coupons: Arc<dyn CouponRepository>,
        leads: LeadCaptureService,
        settings: OrderSettings,
        clock: Arc<dyn Clock>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            orders,
            payment_methods,
            coupons,
            leads,
            settings,
            clock,
            event_sender,
        }
    }

    /// Places an order.
    ///
    /// Everything is validated before the single write; lead conversion, coupon usage
    /// and the `OrderCreated` event follow best-effort.
    #[instrument(skip(self, input), fields(payment_method = %input.payment_method))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<Order, ServiceError> {
        input.validate()?;
        input.check()?;

        let rule = self
            .payment_methods
            .find_by_code(&input.payment_method)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Unknown payment method '{}'",
                    input.payment_method
                ))
            })?;
        rule.ensure_transaction_reference(input.transaction_id.as_deref())?;

        let items: Vec<OrderItem> = input
            .items
            .iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                image: item.image.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.unit_price * Decimal::from(item.quantity),
                variant_id: item.variant_id.clone(),
                variant_snapshot: item.variant_snapshot.clone(),
            })
            .collect();
        let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();
        let plan = payment_plan::plan(subtotal, input.shipping_cost, input.discount, &rule);

        let now = self.clock.now();
        let mut order = Order {
            id: Uuid::new_v4(),
            order_number: String::new(),
            customer: CustomerDetails {
                name: input.customer_name.trim().to_string(),
                phone: input.customer_phone.trim().to_string(),
                email: input.customer_email.clone(),
                address: input.address.trim().to_string(),
                city: input.city.trim().to_string(),
                notes: input.notes.clone(),
            },
            items,
            subtotal,
            discount: (subtotal + input.shipping_cost - plan.total).max(Decimal::ZERO),
            shipping_cost: input.shipping_cost,
            total: plan.total,
            currency: input
                .currency
                .clone()
                .unwrap_or_else(|| self.settings.default_currency.clone()),
            payment_method: rule.code.clone(),
            transaction_id: input
                .transaction_id
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            coupon_code: input.coupon_code.clone().filter(|c| !c.trim().is_empty()),
            payment_status: plan.payment_status(),
            paid_amount: plan.advance_amount,
            due_amount: plan.due_on_delivery,
            partial_rule_snapshot: rule,
            parcel: Default::default(),
            created_at: now,
            updated_at: now,
        };

        let order = self.insert_with_unique_number(&mut order, now).await?;
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "Order created successfully"
        );

        self.after_create(&order, input.lead_session.as_deref()).await;
        Ok(order)
    }

    async fn insert_with_unique_number(
        &self,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let base = generate_order_number(&self.settings.number_prefix, now);
        let attempts = self.settings.max_number_attempts.max(1);
        for attempt in 0..attempts {
            order.order_number = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            match self.orders.insert(order.clone()).await {
                Ok(saved) => return Ok(saved),
                Err(ServiceError::Conflict(message)) => {
                    warn!(order_number = %order.order_number, %message, "Order number taken, retrying");
                }
                Err(e) => {
                    error!(error = %e, "Failed to create order");
                    return Err(e);
                }
            }
        }
        Err(ServiceError::Conflict(format!(
            "Could not allocate a unique order number after {} attempts",
            attempts
        )))
    }

    async fn after_create(&self, order: &Order, lead_session: Option<&str>) {
        if let Some(token) = lead_session {
            match self.leads.convert(token, order.id).await {
                Ok(true) => {}
                Ok(false) => info!(order_id = %order.id, "No active lead to convert"),
                Err(e) => warn!(order_id = %order.id, error = %e, "Failed to convert lead"),
            }
        }

        if let Some(code) = &order.coupon_code {
            if let Err(e) = self.coupons.increment_usage(code).await {
                warn!(order_id = %order.id, coupon = %code, error = %e, "Failed to record coupon usage");
            }
        }

        self.event_sender.publish(Event::OrderCreated {
            order_id: order.id,
            order_number: order.order_number.clone(),
        });
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order_by_number(&self, order_number: &str) -> Result<Order, ServiceError> {
        self.orders
            .find_by_number(order_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
    }
}
