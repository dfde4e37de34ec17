use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

use crate::models::PaymentMethodRule;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Lead capture throttling and deduplication
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct LeadCaptureConfig {
    /// Saves allowed per session within one window
    #[validate(range(min = 1))]
    #[serde(default = "default_max_saves_per_window")]
    pub max_saves_per_window: u32,

    #[validate(range(min = 1))]
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Minimum gap between two saves of one session
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Quiet period before a debounced save fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How far back a lead with the same phone is reused
    #[validate(range(min = 0))]
    #[serde(default = "default_dedup_window_hours")]
    pub dedup_window_hours: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_min_phone_length")]
    pub min_phone_length: usize,

    /// Sessions untouched for this long are forgotten
    #[validate(range(min = 1))]
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for LeadCaptureConfig {
    fn default() -> Self {
        Self {
            max_saves_per_window: default_max_saves_per_window(),
            window_secs: default_window_secs(),
            min_interval_ms: default_min_interval_ms(),
            debounce_ms: default_debounce_ms(),
            dedup_window_hours: default_dedup_window_hours(),
            min_phone_length: default_min_phone_length(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct OrdersConfig {
    #[serde(default = "default_number_prefix")]
    pub number_prefix: String,

    /// Insert attempts before giving up on a unique order number
    #[validate(range(min = 1, max = 20))]
    #[serde(default = "default_max_number_attempts")]
    pub max_number_attempts: u32,

    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            number_prefix: default_number_prefix(),
            max_number_attempts: default_max_number_attempts(),
            default_currency: default_currency(),
        }
    }
}

/// Courier provider credentials
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CourierConfig {
    #[validate(length(min = 1))]
    #[serde(default = "default_courier_provider")]
    pub provider: String,

    #[validate(url)]
    #[serde(default = "default_courier_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default)]
    pub merchant_id: Option<String>,

    #[validate(range(min = 1, max = 120))]
    #[serde(default = "default_courier_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            provider: default_courier_provider(),
            base_url: default_courier_base_url(),
            api_key: String::new(),
            secret_key: String::new(),
            merchant_id: None,
            timeout_secs: default_courier_timeout_secs(),
        }
    }
}

impl CourierConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.secret_key.trim().is_empty()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[validate(custom = "validate_log_level")]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[validate(custom = "validate_event_channel_capacity")]
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    pub lead_capture: LeadCaptureConfig,

    #[serde(default)]
    pub orders: OrdersConfig,

    #[serde(default)]
    pub courier: CourierConfig,

    /// Payment methods offered at checkout
    #[serde(default = "default_payment_methods")]
    pub payment_methods: Vec<PaymentMethodRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            lead_capture: LeadCaptureConfig::default(),
            orders: OrdersConfig::default(),
            courier: CourierConfig::default(),
            payment_methods: default_payment_methods(),
        }
    }
}

impl AppConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the root and every section.
    pub fn validate_all(&self) -> Result<(), AppConfigError> {
        self.validate()?;
        self.lead_capture.validate()?;
        self.orders.validate()?;
        self.courier.validate()?;
        for rule in &self.payment_methods {
            if rule.code.trim().is_empty() {
                return Err(AppConfigError::Invalid(
                    "payment method code cannot be empty".to_string(),
                ));
            }
            if rule.fixed_partial_amount.map_or(false, |a| a < Decimal::ZERO) {
                return Err(AppConfigError::Invalid(format!(
                    "payment method '{}' has a negative fixed advance",
                    rule.code
                )));
            }
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_max_saves_per_window() -> u32 {
    10
}
fn default_window_secs() -> u64 {
    60
}
fn default_min_interval_ms() -> u64 {
    2_000
}
fn default_debounce_ms() -> u64 {
    2_500
}
fn default_dedup_window_hours() -> i64 {
    24
}
fn default_min_phone_length() -> usize {
    5
}

fn default_session_idle_secs() -> u64 {
    3_600
}

fn default_number_prefix() -> String {
    "ORD".to_string()
}
fn default_max_number_attempts() -> u32 {
    5
}
fn default_currency() -> String {
    "BDT".to_string()
}

fn default_courier_provider() -> String {
    "steadfast".to_string()
}
fn default_courier_base_url() -> String {
    "https://portal.packzy.com/api/v1".to_string()
}
fn default_courier_timeout_secs() -> u64 {
    15
}

fn default_payment_methods() -> Vec<PaymentMethodRule> {
    vec![
        PaymentMethodRule::new("cod", "Cash on delivery")
            .cash_on_delivery()
            .with_delivery_charge_advance(),
        PaymentMethodRule::new("online", "Online payment").requiring_transaction_id(),
    ]
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("orderflow={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same layering as [`load_config`] with an explicit config directory and profile.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate_all().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    if !app_config.courier.has_credentials() {
        warn!("Courier credentials are not configured; parcel requests will be rejected by the provider");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}
