//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `BILLING_RECONCILER` prefix and nested values use double underscores as separators.
//! Required secrets may also be given under their conventional flat names
//! (`STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `LEDGER_URL`, `LEDGER_SERVICE_KEY`);
//! the prefixed name wins when both are set.
//!
//! # Example
//!
//! ```no_run
//! use billing_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod ledger;
mod payment;
mod server;

pub use error::{ConfigError, ValidationError};
pub use ledger::{LedgerConfig, LedgerKind};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

const ENV_PREFIX: &str = "BILLING_RECONCILER";

/// Flat environment names accepted for required keys.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("payment.stripe_secret_key", "STRIPE_SECRET_KEY"),
    ("payment.stripe_webhook_secret", "STRIPE_WEBHOOK_SECRET"),
    ("ledger.url", "LEDGER_URL"),
    ("ledger.service_key", "LEDGER_SERVICE_KEY"),
];

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Payment configuration (Stripe)
    pub payment: PaymentConfig,

    /// Ledger store configuration
    pub ledger: LedgerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Registers flat alias variables as lowest-precedence values
    /// 3. Reads environment variables with `BILLING_RECONCILER` prefix
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_RECONCILER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING_RECONCILER__LEDGER__URL=...` -> `ledger.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required values are missing or cannot be
    /// parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        for (key, alias) in ENV_ALIASES {
            if let Ok(value) = std::env::var(alias) {
                builder = builder.set_default(*key, value)?;
            }
        }

        let config = builder
            .add_source(
                config::Environment::default()
                    .prefix(ENV_PREFIX)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.payment.validate()?;
        self.ledger.validate()?;
        if self.is_production() && self.ledger.kind() == Some(LedgerKind::Memory) {
            return Err(ValidationError::MemoryLedgerInProduction);
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
