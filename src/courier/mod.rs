//! Courier provider port.
//!
//! The gateway talks to couriers only through [`CourierProvider`]. Every call returns
//! the raw provider body alongside the parsed data so the exchange can be audited
//! verbatim, whether it succeeded or not.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ServiceError;

pub mod http;

pub use self::http::{HttpCourierProvider, HttpCourierSettings};

/// Parcel creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelRequest {
    pub invoice: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_address: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub cod_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Sent as a header, never in the body
    #[serde(skip)]
    pub idempotency_key: String,
}

impl ParcelRequest {
    /// Request as recorded in the audit log, idempotency key included.
    pub fn audit_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                "idempotency_key".to_string(),
                serde_json::Value::String(self.idempotency_key.clone()),
            );
        }
        payload
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedParcel {
    pub consignment_id: String,
    pub tracking_code: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelStatusReport {
    pub delivery_status: String,
}

/// Parsed provider answer plus the exchange details kept for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse<T> {
    pub http_status: Option<u16>,
    /// Provider body exactly as received (string when not JSON)
    pub raw: serde_json::Value,
    pub data: T,
}

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("Courier request failed: {message}")]
    Transport { message: String },

    #[error("Courier rejected the request: {message}")]
    Rejected {
        http_status: Option<u16>,
        message: String,
        raw: serde_json::Value,
    },

    #[error("Unexpected courier response: {message}")]
    Malformed {
        http_status: Option<u16>,
        message: String,
        raw: serde_json::Value,
    },

    #[error("Courier is not configured: {0}")]
    Configuration(String),
}

impl CourierError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CourierError::Rejected { http_status, .. }
            | CourierError::Malformed { http_status, .. } => *http_status,
            _ => None,
        }
    }

    pub fn raw_body(&self) -> serde_json::Value {
        match self {
            CourierError::Rejected { raw, .. } | CourierError::Malformed { raw, .. } => {
                raw.clone()
            }
            _ => serde_json::Value::Null,
        }
    }
}

impl From<CourierError> for ServiceError {
    fn from(err: CourierError) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

#[async_trait]
pub trait CourierProvider: Send + Sync {
    /// Provider name recorded on parcels and audit entries.
    fn name(&self) -> &str;

    async fn create_parcel(
        &self,
        request: &ParcelRequest,
    ) -> Result<ProviderResponse<CreatedParcel>, CourierError>;

    async fn parcel_status(
        &self,
        consignment_id: &str,
    ) -> Result<ProviderResponse<ParcelStatusReport>, CourierError>;
}
