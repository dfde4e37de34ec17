use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Courier parcel lifecycle state
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParcelState {
    #[default]
    None,
    Created,
    Pending,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
    /// Replaced by a recreated parcel; never reported by a provider
    Superseded,
}

impl ParcelState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParcelState::Delivered | ParcelState::Cancelled | ParcelState::Failed
        )
    }

    /// Maps a provider delivery status onto the internal lifecycle.
    ///
    /// Returns `None` for vocabulary the engine does not know.
    pub fn from_provider_status(status: &str) -> Option<Self> {
        let normalized = status.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let state = match normalized.as_str() {
            "pending" | "in_review" | "hold" | "on_hold" | "accepted" => ParcelState::Pending,
            s if s.ends_with("_approval_pending") => ParcelState::Pending,
            "in_transit" | "picked" | "picked_up" | "shipped" | "out_for_delivery" => {
                ParcelState::InTransit
            }
            "delivered" | "partial_delivered" => ParcelState::Delivered,
            "cancelled" | "canceled" => ParcelState::Cancelled,
            "failed" | "returned" | "lost" => ParcelState::Failed,
            _ => return None,
        };
        Some(state)
    }
}

/// One parcel issued with the courier provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub provider: String,
    pub consignment_id: String,
    pub tracking_id: Option<String>,
    pub state: ParcelState,
    /// Raw status string last reported by the provider
    pub provider_status: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Courier sub-state of an order: the live parcel plus any parcels replaced by recreate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourierParcel {
    pub current: Option<ParcelRecord>,
    #[serde(default)]
    pub superseded: Vec<ParcelRecord>,
}

impl CourierParcel {
    pub fn state(&self) -> ParcelState {
        self.current
            .as_ref()
            .map(|p| p.state)
            .unwrap_or(ParcelState::None)
    }

    pub fn consignment_id(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.consignment_id.as_str())
    }

    /// Number of parcels ever issued for the order.
    pub fn issued(&self) -> usize {
        self.superseded.len() + usize::from(self.current.is_some())
    }

    /// Installs `record` as the live parcel, moving the previous one to the superseded history.
    pub fn replace(&mut self, record: ParcelRecord, at: DateTime<Utc>) {
        if let Some(mut previous) = self.current.take() {
            previous.state = ParcelState::Superseded;
            previous.updated_at = at;
            self.superseded.push(previous);
        }
        self.current = Some(record);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CourierAction {
    Create,
    Recreate,
    Track,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// Append-only record of one exchange with the courier provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierAuditEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: CourierAction,
    pub provider: String,
    pub outcome: AuditOutcome,
    pub http_status: Option<u16>,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
