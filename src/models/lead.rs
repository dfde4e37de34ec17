use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Converted,
    Invalid,
}

/// Cart line as seen by the customer when the snapshot was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadCustomer {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadTotals {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub currency: String,
}

/// Where the checkout came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadSource {
    pub page_url: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub user_agent: Option<String>,
}

/// Recoverable snapshot of an in-progress checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    /// Client-held correlation token; possession authorizes conversion
    pub token: String,
    pub status: LeadStatus,
    pub customer: LeadCustomer,
    pub items: Vec<LeadItem>,
    pub totals: LeadTotals,
    pub source: LeadSource,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub converted_order_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadItemInput {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// Checkout form + cart state posted by the storefront.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadInput {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<LeadItemInput>,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub shipping_fee: Option<Decimal>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl LeadInput {
    /// Trimmed phone, if any was entered.
    pub fn normalized_phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    fn items_snapshot(&self) -> Vec<LeadItem> {
        self.items
            .iter()
            .map(|item| LeadItem {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                line_total: item.unit_price * Decimal::from(item.quantity),
            })
            .collect()
    }

    fn totals(&self, items: &[LeadItem], default_currency: &str) -> LeadTotals {
        let subtotal = self
            .subtotal
            .unwrap_or_else(|| items.iter().map(|i| i.line_total).sum());
        let shipping_fee = self.shipping_fee.unwrap_or(Decimal::ZERO);
        LeadTotals {
            subtotal,
            shipping_fee,
            total: self.total.unwrap_or(subtotal + shipping_fee),
            currency: self
                .currency
                .clone()
                .unwrap_or_else(|| default_currency.to_string()),
        }
    }
}

impl Lead {
    pub fn from_input(
        id: Uuid,
        token: String,
        input: &LeadInput,
        default_currency: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut lead = Self {
            id,
            token,
            status: LeadStatus::New,
            customer: LeadCustomer::default(),
            items: Vec::new(),
            totals: LeadTotals::default(),
            source: LeadSource::default(),
            created_at: now,
            last_activity_at: now,
            converted_order_id: None,
            converted_at: None,
        };
        lead.apply(input, default_currency, now);
        lead
    }

    /// Overwrites the snapshot with the latest checkout state.
    ///
    /// Attribution fields only replace earlier values when present, so the landing
    /// page that first brought the customer in is not lost on later saves.
    pub fn apply(&mut self, input: &LeadInput, default_currency: &str, now: DateTime<Utc>) {
        self.customer = LeadCustomer {
            phone: input.normalized_phone().unwrap_or_default().to_string(),
            name: input.name.clone(),
            email: input.email.clone(),
            address: input.address.clone(),
            city: input.city.clone(),
            country: input.country.clone(),
            notes: input.notes.clone(),
        };
        self.items = input.items_snapshot();
        self.totals = input.totals(&self.items, default_currency);

        let source = &mut self.source;
        for (slot, value) in [
            (&mut source.page_url, &input.page_url),
            (&mut source.utm_source, &input.utm_source),
            (&mut source.utm_medium, &input.utm_medium),
            (&mut source.utm_campaign, &input.utm_campaign),
            (&mut source.user_agent, &input.user_agent),
        ] {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        self.last_activity_at = now;
    }

    pub fn is_converted(&self) -> bool {
        self.status == LeadStatus::Converted
    }
}
