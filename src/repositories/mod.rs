//! Persistence ports used by the lifecycle services.
//!
//! Storage schema is owned by the host application; the engine only depends on these
//! traits. Each port ships with an in-memory implementation used by the binary's
//! standalone mode and by the test-suite.

use std::sync::Arc;

pub mod audit_log;
pub mod lead_repository;
pub mod order_repository;
pub mod store_settings;

pub use audit_log::{CourierAuditLog, InMemoryCourierAuditLog};
pub use lead_repository::{InMemoryLeadRepository, LeadRepository};
pub use order_repository::{InMemoryOrderRepository, OrderRepository};
pub use store_settings::{
    CouponRepository, InMemoryCouponRepository, InMemoryPaymentMethodRepository,
    PaymentMethodRepository,
};

use crate::models::PaymentMethodRule;

/// Bundle of every port the engine needs.
#[derive(Clone)]
pub struct Repositories {
    pub leads: Arc<dyn LeadRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payment_methods: Arc<dyn PaymentMethodRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub courier_audit: Arc<dyn CourierAuditLog>,
}

impl Repositories {
    pub fn in_memory(payment_methods: Vec<PaymentMethodRule>) -> Self {
        Self {
            leads: Arc::new(InMemoryLeadRepository::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
            payment_methods: Arc::new(InMemoryPaymentMethodRepository::with_rules(
                payment_methods,
            )),
            coupons: Arc::new(InMemoryCouponRepository::new()),
            courier_audit: Arc::new(InMemoryCourierAuditLog::new()),
        }
    }
}
