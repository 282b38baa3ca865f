use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "usd";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Base URL of the cart service
    #[serde(default = "default_cart_service_url")]
    pub cart_service_url: String,

    /// Base URL of the user directory service
    #[serde(default = "default_user_service_url")]
    pub user_service_url: String,

    /// Base URL of the product catalog service
    #[serde(default = "default_product_service_url")]
    pub product_service_url: String,

    /// Base URL of the promotion validation service
    #[serde(default = "default_promotion_service_url")]
    pub promotion_service_url: String,

    /// Base URL of the notification (email) service
    #[serde(default = "default_notification_service_url")]
    pub notification_service_url: String,

    /// Geocoding API endpoint
    #[serde(default = "default_geocoding_api_url")]
    pub geocoding_api_url: String,

    /// Geocoding API key
    #[serde(default)]
    pub geocoding_api_key: Option<String>,

    /// Hosted checkout API endpoint of the payment provider
    #[serde(default = "default_payment_api_url")]
    pub payment_api_url: String,

    /// Secret API key for the payment provider
    #[serde(default)]
    pub payment_secret_key: Option<String>,

    /// Currency for checkout sessions
    #[serde(default = "default_currency")]
    pub payment_currency: String,

    /// Storefront URL the payment page redirects to on success
    #[serde(default = "default_checkout_success_url")]
    pub checkout_success_url: String,

    /// Storefront URL the payment page redirects to on cancel
    #[serde(default = "default_checkout_cancel_url")]
    pub checkout_cancel_url: String,

    /// Webhook secret for verifying payment gateway callbacks
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default)]
    pub payment_webhook_tolerance_secs: Option<u64>,

    /// Timeout applied to every outbound collaborator call (seconds)
    #[serde(default = "default_http_client_timeout_secs")]
    #[validate(custom = "validate_http_client_timeout")]
    pub http_client_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_cart_service_url() -> String {
    "http://localhost:8082".to_string()
}
fn default_user_service_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_product_service_url() -> String {
    "http://localhost:8081".to_string()
}
fn default_promotion_service_url() -> String {
    "http://localhost:8085".to_string()
}
fn default_notification_service_url() -> String {
    "http://localhost:8085".to_string()
}
fn default_geocoding_api_url() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}
fn default_payment_api_url() -> String {
    "https://api.stripe.com/v1/checkout/sessions".to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_checkout_success_url() -> String {
    "http://localhost:3000/orders".to_string()
}
fn default_checkout_cancel_url() -> String {
    "http://localhost:3000/cart".to_string()
}
fn default_http_client_timeout_secs() -> u64 {
    10
}
fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_http_client_timeout(value: u64) -> Result<(), ValidationError> {
    if value == 0 || value > 120 {
        let mut err = ValidationError::new("http_client_timeout_secs");
        err.message = Some("outbound call timeout must be between 1 and 120 seconds".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(value: usize) -> Result<(), ValidationError> {
    if value == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event channel capacity must be non-zero".into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything optional
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            cart_service_url: default_cart_service_url(),
            user_service_url: default_user_service_url(),
            product_service_url: default_product_service_url(),
            promotion_service_url: default_promotion_service_url(),
            notification_service_url: default_notification_service_url(),
            geocoding_api_url: default_geocoding_api_url(),
            geocoding_api_key: None,
            payment_api_url: default_payment_api_url(),
            payment_secret_key: None,
            payment_currency: default_currency(),
            checkout_success_url: default_checkout_success_url(),
            checkout_cancel_url: default_checkout_cancel_url(),
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: None,
            http_client_timeout_secs: default_http_client_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Constraints that cross individual fields; run after field validation.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins");
            err.message = Some(
                "explicit CORS origins are required outside development \
                 (or set cors_allow_any_origin)"
                    .into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        // Unsigned webhooks are acceptable only while developing against a stub gateway.
        if self.is_production() && self.payment_webhook_secret.is_none() {
            let mut err = ValidationError::new("payment_webhook_secret");
            err.message =
                Some("payment_webhook_secret must be configured in production".into());
            errors.add("payment_webhook_secret", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("orderflow_api={},tower_http=debug", level);
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

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
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

    let builder = Config::builder()
        .set_default("database_url", "sqlite://orderflow.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(environment: &str) -> AppConfig {
        AppConfig::new(
            "sqlite://orderflow.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            environment.into(),
        )
    }

    #[test]
    fn development_allows_permissive_cors_by_default() {
        let cfg = base_config("development");
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config("staging");
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config("staging");
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn production_requires_webhook_secret() {
        let mut cfg = base_config("production");
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.payment_webhook_secret = Some("whsec_test".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn outbound_timeout_is_bounded() {
        let mut cfg = base_config("development");
        cfg.http_client_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        cfg.http_client_timeout_secs = 10;
        assert!(cfg.validate().is_ok());
    }
}
