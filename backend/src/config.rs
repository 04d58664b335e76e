//! Configuration management for the marketplace stock ledger
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with MKT_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Payment gateway configuration
    pub payment: PaymentConfig,

    /// Loyalty service configuration
    pub loyalty: LoyaltyConfig,

    /// Log output configuration
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret used to verify bearer tokens issued by the auth service
    pub secret: String,
}

/// Where payment contexts live between checkout and the gateway callback
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContextStoreBackend {
    /// Process-local map; only safe with a single instance
    Memory,
    /// Shared table; safe behind a load balancer
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    /// Merchant id issued by the gateway
    pub merchant_id: String,

    /// Merchant key, also the signing key
    pub merchant_key: String,

    /// Optional passphrase appended to the signature base string
    pub passphrase: Option<String>,

    /// Gateway process URL the customer is redirected to
    pub gateway_url: String,

    /// Where the gateway sends the customer after paying
    pub return_url: String,

    /// Where the gateway sends the customer after cancelling
    pub cancel_url: String,

    /// Webhook the gateway posts notifications to
    pub notify_url: String,

    /// Reject notifications whose signature does not verify
    pub verify_signatures: bool,

    /// Lifetime of a payment context in hours
    pub context_ttl_hours: i64,

    /// Interval of the expired-context sweep in minutes
    pub sweep_interval_minutes: u64,

    /// Backend for payment contexts
    pub context_store: ContextStoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoyaltyConfig {
    /// Loyalty service base URL; accrual is skipped when unset
    pub endpoint: Option<String>,

    /// API key for the loyalty service
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("MKT_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("payment.merchant_id", "")?
            .set_default("payment.merchant_key", "")?
            .set_default("payment.return_url", "")?
            .set_default("payment.cancel_url", "")?
            .set_default("payment.notify_url", "")?
            .set_default("jwt.secret", "")?
            .set_default("payment.gateway_url", "https://sandbox.payfast.co.za/eng/process")?
            .set_default("payment.verify_signatures", true)?
            .set_default("payment.context_ttl_hours", 24)?
            .set_default("payment.sweep_interval_minutes", 60)?
            .set_default("payment.context_store", "memory")?
            .set_default("loyalty.timeout_seconds", 5)?
            .set_default("log.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (MKT_ prefix)
            .add_source(
                Environment::with_prefix("MKT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject configurations the service cannot take payments with
    pub fn validate(&self) -> AppResult<()> {
        self.payment.validate()?;
        if self.jwt.secret.trim().is_empty() {
            return Err(AppError::Configuration("jwt.secret is not set".to_string()));
        }
        Ok(())
    }
}

impl PaymentConfig {
    pub fn validate(&self) -> AppResult<()> {
        let required = [
            ("payment.merchant_id", &self.merchant_id),
            ("payment.merchant_key", &self.merchant_key),
            ("payment.return_url", &self.return_url),
            ("payment.cancel_url", &self.cancel_url),
            ("payment.notify_url", &self.notify_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Configuration(format!("{} is not set", name)));
            }
        }
        if self.context_ttl_hours <= 0 {
            return Err(AppError::Configuration(
                "payment.context_ttl_hours must be positive".to_string(),
            ));
        }
        if self.sweep_interval_minutes == 0 {
            return Err(AppError::Configuration(
                "payment.sweep_interval_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn context_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.context_ttl_hours)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_minutes * 60)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
