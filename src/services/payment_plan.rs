use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{PartialType, PaymentMethodRule, PaymentStatus};

/// Split of an order total into the advance paid at checkout and the balance
/// collected on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub total: Decimal,
    pub advance_amount: Decimal,
    pub due_on_delivery: Decimal,
}

impl PaymentPlan {
    pub fn payment_status(&self) -> PaymentStatus {
        if self.advance_amount >= self.total {
            PaymentStatus::Paid
        } else if self.advance_amount.is_zero() {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::PartialPaid
        }
    }
}

/// Computes the payment plan for an order.
///
/// Negative inputs count as zero and the discount is clamped to the gross amount,
/// so `advance_amount + due_on_delivery == total` always holds.
pub fn plan(
    subtotal: Decimal,
    shipping_cost: Decimal,
    discount: Decimal,
    rule: &PaymentMethodRule,
) -> PaymentPlan {
    let subtotal = subtotal.max(Decimal::ZERO);
    let shipping_cost = shipping_cost.max(Decimal::ZERO);
    let gross = subtotal + shipping_cost;
    let discount = discount.max(Decimal::ZERO).min(gross);
    let total = gross - discount;

    let advance_amount = if rule.allow_partial_delivery_payment {
        match rule.partial_type {
            PartialType::DeliveryCharge => shipping_cost,
            PartialType::FixedAmount => rule
                .fixed_partial_amount
                .unwrap_or(Decimal::ZERO)
                .max(Decimal::ZERO),
            PartialType::None => Decimal::ZERO,
        }
        .min(total)
    } else {
        Decimal::ZERO
    };

    PaymentPlan {
        total,
        advance_amount,
        due_on_delivery: (total - advance_amount).max(Decimal::ZERO),
    }
}
