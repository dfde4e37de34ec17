use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::Order;

/// Repository for order operations
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists the order together with its line items as one unit.
    ///
    /// Fails with `Conflict` when the order number is already taken.
    async fn insert(&self, order: Order) -> Result<Order, ServiceError>;

    async fn update(&self, order: Order) -> Result<Order, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<Uuid, Order>,
    numbers: DashMap<String, Uuid>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: Order) -> Result<Order, ServiceError> {
        // The number index is the uniqueness constraint; claim it first.
        match self.numbers.entry(order.order_number.clone()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "Order number {} already exists",
                    order.order_number
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(order.id);
            }
        }
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update(&self, order: Order) -> Result<Order, ServiceError> {
        match self.orders.get_mut(&order.id) {
            Some(mut stored) => {
                if stored.order_number != order.order_number {
                    return Err(ServiceError::InvalidOperation(
                        "Order number cannot change".to_string(),
                    ));
                }
                *stored = order.clone();
                Ok(order)
            }
            None => Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order.id
            ))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, ServiceError> {
        let Some(id) = self.numbers.get(order_number).map(|id| *id) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }
}
