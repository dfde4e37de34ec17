use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    CourierError, CourierProvider, CreatedParcel, ParcelRequest, ParcelStatusReport,
    ProviderResponse,
};
use crate::config::CourierConfig;

#[derive(Debug, Clone)]
pub struct HttpCourierSettings {
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub merchant_id: Option<String>,
    pub timeout: Duration,
}

impl From<&CourierConfig> for HttpCourierSettings {
    fn from(config: &CourierConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            merchant_id: config.merchant_id.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateOrderBody {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    consignment: Option<ConsignmentBody>,
}

#[derive(Debug, Deserialize)]
struct ConsignmentBody {
    consignment_id: Value,
    #[serde(default)]
    tracking_code: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    delivery_status: Option<String>,
}

/// Provider-declared failure: a numeric `status` outside 2xx.
fn declared_failure(status: &Option<Value>) -> bool {
    status
        .as_ref()
        .and_then(Value::as_u64)
        .map_or(false, |code| !(200..300).contains(&code))
}

/// Consignment ids arrive as strings or numbers depending on the provider.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Courier provider speaking the common merchant REST API
/// (`/create_order`, `/status_by_cid/{id}`) with key/secret headers.
pub struct HttpCourierProvider {
    client: Client,
    settings: HttpCourierSettings,
}

impl HttpCourierProvider {
    pub fn new(settings: HttpCourierSettings) -> Result<Self, CourierError> {
        if settings.base_url.trim().is_empty() {
            return Err(CourierError::Configuration("base_url is empty".to_string()));
        }
        Url::parse(&settings.base_url)
            .map_err(|e| CourierError::Configuration(format!("invalid base_url: {}", e)))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CourierError::Configuration(e.to_string()))?;
        Ok(Self::with_client(settings, client))
    }

    /// Build a provider from an existing client (useful for testing).
    pub fn with_client(settings: HttpCourierSettings, client: Client) -> Self {
        Self { client, settings }
    }

    /// Base URL with each of `segments` appended as one percent-encoded path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CourierError> {
        let mut url = Url::parse(&self.settings.base_url)
            .map_err(|e| CourierError::Configuration(format!("invalid base_url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| CourierError::Configuration("base_url cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("Api-Key", &self.settings.api_key)
            .header("Secret-Key", &self.settings.secret_key)
            .header("Accept", "application/json");
        match &self.settings.merchant_id {
            Some(merchant_id) => builder.header("Merchant-Id", merchant_id),
            None => builder,
        }
    }

    /// Sends the request and returns the HTTP status with the body kept verbatim.
    async fn exchange(&self, builder: RequestBuilder) -> Result<(u16, Value), CourierError> {
        let response = builder.send().await.map_err(|e| CourierError::Transport {
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| CourierError::Transport {
            message: e.to_string(),
        })?;
        let raw = serde_json::from_str(&text).unwrap_or(Value::String(text));
        debug!(status, "courier response received");
        Ok((status, raw))
    }

    fn rejection(status: u16, raw: Value, message: Option<String>) -> CourierError {
        let message = message
            .or_else(|| raw.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status));
        CourierError::Rejected {
            http_status: Some(status),
            message,
            raw,
        }
    }
}

#[async_trait]
impl CourierProvider for HttpCourierProvider {
    fn name(&self) -> &str {
        &self.settings.provider
    }

    async fn create_parcel(
        &self,
        request: &ParcelRequest,
    ) -> Result<ProviderResponse<CreatedParcel>, CourierError> {
        let builder = self
            .authorized(self.client.post(self.endpoint(&["create_order"])?))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request);
        let (status, raw) = self.exchange(builder).await?;

        if !(200..300).contains(&status) {
            warn!(status, invoice = %request.invoice, "courier rejected parcel");
            return Err(Self::rejection(status, raw, None));
        }

        let body: CreateOrderBody =
            serde_json::from_value(raw.clone()).map_err(|e| CourierError::Malformed {
                http_status: Some(status),
                message: e.to_string(),
                raw: raw.clone(),
            })?;
        if declared_failure(&body.status) {
            return Err(Self::rejection(status, raw, body.message));
        }
        let Some(consignment) = body.consignment else {
            return Err(Self::rejection(
                status,
                raw,
                body.message.or_else(|| Some("No consignment returned".to_string())),
            ));
        };
        let Some(consignment_id) = id_string(&consignment.consignment_id) else {
            return Err(CourierError::Malformed {
                http_status: Some(status),
                message: "consignment_id missing".to_string(),
                raw,
            });
        };

        Ok(ProviderResponse {
            http_status: Some(status),
            raw,
            data: CreatedParcel {
                consignment_id,
                tracking_code: consignment.tracking_code,
                status: consignment.status,
            },
        })
    }

    async fn parcel_status(
        &self,
        consignment_id: &str,
    ) -> Result<ProviderResponse<ParcelStatusReport>, CourierError> {
        let url = self.endpoint(&["status_by_cid", consignment_id])?;
        let builder = self.authorized(self.client.get(url));
        let (status, raw) = self.exchange(builder).await?;

        if !(200..300).contains(&status) {
            return Err(Self::rejection(status, raw, None));
        }

        let body: StatusBody =
            serde_json::from_value(raw.clone()).map_err(|e| CourierError::Malformed {
                http_status: Some(status),
                message: e.to_string(),
                raw: raw.clone(),
            })?;
        if declared_failure(&body.status) {
            return Err(Self::rejection(status, raw, body.message));
        }
        let Some(delivery_status) = body.delivery_status else {
            return Err(CourierError::Malformed {
                http_status: Some(status),
                message: "delivery_status missing".to_string(),
                raw,
            });
        };

        Ok(ProviderResponse {
            http_status: Some(status),
            raw,
            data: ParcelStatusReport { delivery_status },
        })
    }
}
