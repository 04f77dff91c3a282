//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// AI moderation configuration.
    #[serde(default)]
    pub moderation: ModerationConfig,
    /// Billing configuration.
    #[serde(default)]
    pub billing: BillingConfig,
    /// Email configuration.
    #[serde(default)]
    pub email: EmailSettings,
    /// External SSO configuration.
    #[serde(default)]
    pub sso: SsoConfig,
    /// Upload storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// AI moderation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationConfig {
    /// API key for the completion provider.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model identifier (e.g. "gpt-4o-mini").
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override for OpenAI-compatible providers.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Billing configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingConfig {
    /// Stripe secret API key (`sk_...`).
    #[serde(default)]
    pub stripe_secret_key: Option<String>,
    /// Stripe webhook signing secret (`whsec_...`).
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,
    /// Stripe price id for the standard plan.
    #[serde(default)]
    pub stripe_standard_price_id: Option<String>,
    /// Stripe price id for the founder plan.
    #[serde(default)]
    pub stripe_founder_price_id: Option<String>,
    /// PayPal client id.
    #[serde(default)]
    pub paypal_client_id: Option<String>,
    /// PayPal client secret.
    #[serde(default)]
    pub paypal_client_secret: Option<String>,
    /// PayPal plan id for the standard plan.
    #[serde(default)]
    pub paypal_standard_plan_id: Option<String>,
    /// PayPal plan id for the founder plan.
    #[serde(default)]
    pub paypal_founder_plan_id: Option<String>,
    /// PayPal webhook id (for transmission verification).
    #[serde(default)]
    pub paypal_webhook_id: Option<String>,
    /// Use the PayPal sandbox environment.
    #[serde(default = "default_true")]
    pub paypal_sandbox: bool,
}

/// Email configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailSettings {
    /// Provider: "smtp" or "sendgrid". Empty disables email.
    #[serde(default)]
    pub provider: Option<String>,
    /// From address.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// From display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// SMTP host.
    #[serde(default)]
    pub smtp_host: Option<String>,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    #[serde(default)]
    pub smtp_username: Option<String>,
    /// SMTP password.
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// SendGrid API key.
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
}

/// External SSO configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SsoConfig {
    /// HS256 signing secret for issued tokens.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// Base URL of the external project-management app.
    #[serde(default)]
    pub external_app_url: Option<String>,
}

/// Upload storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory for uploaded files.
    #[serde(default = "default_upload_path")]
    pub path: String,
    /// Base URL for serving uploads.
    #[serde(default = "default_upload_url")]
    pub base_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            base_url: default_upload_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_true() -> bool {
    true
}

fn default_from_address() -> String {
    "noreply@foundersocials.local".to_string()
}

fn default_from_name() -> String {
    "FounderSocials".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_token_ttl() -> u64 {
    900
}

fn default_upload_path() -> String {
    "./uploads".to_string()
}

fn default_upload_url() -> String {
    "/uploads".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `FOUNDER_ENV`)
    /// 3. Environment variables with `FOUNDER_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("FOUNDER_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("FOUNDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("FOUNDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
