use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Lead, LeadStatus};

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn insert(&self, lead: Lead) -> Result<Lead, ServiceError>;

    /// Replaces a stored lead; `NotFound` when the id is unknown.
    async fn update(&self, lead: Lead) -> Result<Lead, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, ServiceError>;

    /// Most recent lead for `phone` created at or after `since` that is not converted.
    async fn find_open_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Lead>, ServiceError>;

    /// Marks the lead converted only if `token` matches the stored token and the lead
    /// is not converted yet. Returns whether a lead was updated.
    async fn mark_converted(
        &self,
        id: Uuid,
        token: &str,
        order_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLeadRepository {
    leads: DashMap<Uuid, Lead>,
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn insert(&self, lead: Lead) -> Result<Lead, ServiceError> {
        match self.leads.entry(lead.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "Lead {} already exists",
                lead.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(lead.clone());
                Ok(lead)
            }
        }
    }

    async fn update(&self, lead: Lead) -> Result<Lead, ServiceError> {
        match self.leads.get_mut(&lead.id) {
            Some(mut stored) => {
                *stored = lead.clone();
                Ok(lead)
            }
            None => Err(ServiceError::NotFound(format!("Lead {} not found", lead.id))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, ServiceError> {
        Ok(self.leads.get(&id).map(|l| l.clone()))
    }

    async fn find_open_by_phone(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Lead>, ServiceError> {
        Ok(self
            .leads
            .iter()
            .filter(|l| {
                l.customer.phone == phone
                    && l.created_at >= since
                    && l.status != LeadStatus::Converted
            })
            .max_by_key(|l| l.created_at)
            .map(|l| l.clone()))
    }

    async fn mark_converted(
        &self,
        id: Uuid,
        token: &str,
        order_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let Some(mut lead) = self.leads.get_mut(&id) else {
            return Ok(false);
        };
        if lead.token != token || lead.is_converted() {
            return Ok(false);
        }
        lead.status = LeadStatus::Converted;
        lead.converted_order_id = Some(order_id);
        lead.converted_at = Some(at);
        lead.last_activity_at = at;
        Ok(true)
    }
}
