use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::CourierAuditEntry;

/// Append-only log of courier provider exchanges.
#[async_trait]
pub trait CourierAuditLog: Send + Sync {
    async fn append(&self, entry: CourierAuditEntry) -> Result<(), ServiceError>;

    /// Entries for one order in append order.
    async fn entries_for_order(&self, order_id: Uuid)
        -> Result<Vec<CourierAuditEntry>, ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCourierAuditLog {
    entries: RwLock<Vec<CourierAuditEntry>>,
}

impl InMemoryCourierAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CourierAuditLog for InMemoryCourierAuditLog {
    async fn append(&self, entry: CourierAuditEntry) -> Result<(), ServiceError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<CourierAuditEntry>, ServiceError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }
}
