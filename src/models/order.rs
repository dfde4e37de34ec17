use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::parcel::CourierParcel;
use super::payment_method::PaymentMethodRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartialPaid,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: String,
    pub city: String,
    pub notes: Option<String>,
}

/// Line item with a catalog snapshot taken at placement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: String,
    pub name: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub variant_id: Option<String>,
    pub variant_snapshot: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer: CustomerDetails,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub coupon_code: Option<String>,
    pub payment_status: PaymentStatus,
    pub paid_amount: Decimal,
    pub due_amount: Decimal,
    /// Rule exactly as applied when the order was placed
    pub partial_rule_snapshot: PaymentMethodRule,
    #[serde(default)]
    pub parcel: CourierParcel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_cash_on_delivery(&self) -> bool {
        self.partial_rule_snapshot.is_cash_on_delivery
    }

    /// `paid_amount + due_amount == total`
    pub fn amounts_balance(&self) -> bool {
        self.paid_amount + self.due_amount == self.total
    }
}
