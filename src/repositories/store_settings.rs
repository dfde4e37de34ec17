use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::ServiceError;
use crate::models::PaymentMethodRule;

/// Read side of the store's payment method settings.
#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<PaymentMethodRule>, ServiceError>;
}

/// Coupon usage counters.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Increments and returns the usage count; `NotFound` for unknown codes.
    async fn increment_usage(&self, code: &str) -> Result<u32, ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPaymentMethodRepository {
    rules: DashMap<String, PaymentMethodRule>,
}

impl InMemoryPaymentMethodRepository {
    pub fn with_rules(rules: impl IntoIterator<Item = PaymentMethodRule>) -> Self {
        let repo = Self::default();
        for rule in rules {
            repo.upsert(rule);
        }
        repo
    }

    /// Replaces the rule for its code; orders already placed keep their snapshot.
    pub fn upsert(&self, rule: PaymentMethodRule) {
        self.rules.insert(rule.code.to_ascii_lowercase(), rule);
    }
}

#[async_trait]
impl PaymentMethodRepository for InMemoryPaymentMethodRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<PaymentMethodRule>, ServiceError> {
        Ok(self
            .rules
            .get(&code.trim().to_ascii_lowercase())
            .map(|r| r.clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCouponRepository {
    usage: DashMap<String, u32>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, code: &str) {
        self.usage.entry(code.to_ascii_uppercase()).or_insert(0);
    }

    pub fn usage(&self, code: &str) -> Option<u32> {
        self.usage.get(&code.to_ascii_uppercase()).map(|c| *c)
    }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn increment_usage(&self, code: &str) -> Result<u32, ServiceError> {
        match self.usage.get_mut(&code.trim().to_ascii_uppercase()) {
            Some(mut count) => {
                *count += 1;
                Ok(*count)
            }
            None => Err(ServiceError::NotFound(format!("Coupon {} not found", code))),
        }
    }
}
