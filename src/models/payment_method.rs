use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::errors::ServiceError;

/// How the advance portion of a partially paid order is derived
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartialType {
    #[default]
    None,
    /// Advance equals the shipping fee
    DeliveryCharge,
    /// Advance is a fixed amount, capped at the order total
    FixedAmount,
}

/// Payment method rule as configured in the store settings.
///
/// A copy of the rule is frozen onto every order at placement time, so later edits
/// never change the terms of historical orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodRule {
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Balance is collected by the courier at handoff
    #[serde(default)]
    pub is_cash_on_delivery: bool,
    #[serde(default)]
    pub allow_partial_delivery_payment: bool,
    #[serde(default)]
    pub partial_type: PartialType,
    #[serde(default)]
    pub fixed_partial_amount: Option<Decimal>,
    #[serde(default)]
    pub require_transaction_id: bool,
}

impl PaymentMethodRule {
    /// Plain rule: no partial payment, no transaction reference.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            is_cash_on_delivery: false,
            allow_partial_delivery_payment: false,
            partial_type: PartialType::None,
            fixed_partial_amount: None,
            require_transaction_id: false,
        }
    }

    pub fn cash_on_delivery(mut self) -> Self {
        self.is_cash_on_delivery = true;
        self
    }

    pub fn with_delivery_charge_advance(mut self) -> Self {
        self.allow_partial_delivery_payment = true;
        self.partial_type = PartialType::DeliveryCharge;
        self
    }

    pub fn with_fixed_advance(mut self, amount: Decimal) -> Self {
        self.allow_partial_delivery_payment = true;
        self.partial_type = PartialType::FixedAmount;
        self.fixed_partial_amount = Some(amount);
        self
    }

    pub fn requiring_transaction_id(mut self) -> Self {
        self.require_transaction_id = true;
        self
    }

    /// Fails when the rule demands a transaction reference and none (or only whitespace) was given.
    pub fn ensure_transaction_reference(&self, reference: Option<&str>) -> Result<(), ServiceError> {
        if !self.require_transaction_id {
            return Ok(());
        }
        match reference.map(str::trim) {
            Some(r) if !r.is_empty() => Ok(()),
            _ => Err(ServiceError::ValidationError(format!(
                "Payment method '{}' requires a transaction id",
                self.code
            ))),
        }
    }

    /// JSON form of the rule as stored for audit.
    pub fn snapshot(&self) -> Result<serde_json::Value, ServiceError> {
        Ok(serde_json::to_value(self)?)
    }
}
