use std::env;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_SHIPPING_FEE: i64 = 49;
const DEFAULT_TAX_RATE: f64 = 0.18;
const DEFAULT_MAX_PAYMENT_ATTEMPTS: u32 = 3;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CART_STORAGE_KEY: &str = "rentkart.cart.v1";

/// Payment backend selection.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// "simulated" or "rest".
    #[serde(default = "default_gateway_mode")]
    #[validate(custom = "validate_gateway_mode")]
    pub mode: String,

    /// Base URL of the hosted backend; required for the rest mode.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token of the authenticated session, if any.
    #[serde(default)]
    pub session_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: default_gateway_mode(),
            base_url: None,
            session_token: None,
        }
    }
}

/// Checkout-core configuration with validation.
///
/// Shipping fee and tax rate are fixed order-level constants, not negotiable
/// per item; they exist here so environments can tune them without a rebuild.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// ISO currency code used for every intent.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Flat delivery fee added to every order, whole rupees.
    #[serde(default = "default_shipping_fee")]
    #[validate(range(min = 0))]
    pub shipping_fee: i64,

    /// GST rate applied on top of the cart total.
    #[serde(default = "default_tax_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub tax_rate: f64,

    /// Submissions allowed per intent before it is canceled.
    #[serde(default = "default_max_payment_attempts")]
    #[validate(range(min = 1))]
    pub max_payment_attempts: u32,

    /// Deadline for every gateway and ledger call.
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1))]
    pub gateway_timeout_secs: u64,

    /// Fixed key the serialized cart snapshot is stored under.
    #[serde(default = "default_cart_storage_key")]
    #[validate(length(min = 1))]
    pub cart_storage_key: String,

    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            currency: default_currency(),
            shipping_fee: default_shipping_fee(),
            tax_rate: default_tax_rate(),
            max_payment_attempts: default_max_payment_attempts(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            cart_storage_key: default_cart_storage_key(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_shipping_fee() -> i64 {
    DEFAULT_SHIPPING_FEE
}

fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}

fn default_max_payment_attempts() -> u32 {
    DEFAULT_MAX_PAYMENT_ATTEMPTS
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_cart_storage_key() -> String {
    DEFAULT_CART_STORAGE_KEY.to_string()
}

fn default_gateway_mode() -> String {
    "simulated".to_string()
}

fn validate_gateway_mode(mode: &str) -> Result<(), ValidationError> {
    match mode {
        "simulated" | "rest" => Ok(()),
        _ => Err(ValidationError::new("unknown_gateway_mode")),
    }
}

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Loads configuration from defaults, `config/` profile files and
/// `APP__`-prefixed environment variables, then validates it.
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

    let config = Config::builder()
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("currency", DEFAULT_CURRENCY)?
        .set_default("shipping_fee", DEFAULT_SHIPPING_FEE)?
        .set_default("tax_rate", DEFAULT_TAX_RATE)?
        .set_default("max_payment_attempts", DEFAULT_MAX_PAYMENT_ATTEMPTS)?
        .set_default("gateway_timeout_secs", DEFAULT_GATEWAY_TIMEOUT_SECS)?
        .set_default("cart_storage_key", DEFAULT_CART_STORAGE_KEY)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| AppConfigError::Validation(e.to_string()))?;

    Ok(app_config)
}

/// Initializes the tracing subscriber with an env-filter.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("rentkart_checkout={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}
