//! Ledger store configuration

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use super::error::ValidationError;

/// Ledger store configuration
///
/// The URL scheme selects the adapter: `postgres://`/`postgresql://` for sqlx,
/// `http(s)://` for a PostgREST API, `memory://` for an in-process store.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Connection URL or REST root
    pub url: String,

    /// Service key for REST stores
    pub service_key: Option<SecretString>,

    /// Maximum connections allowed
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// REST request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Run migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

/// Store selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Postgres,
    Rest,
    Memory,
}

impl LedgerConfig {
    pub fn kind(&self) -> Option<LedgerKind> {
        let url = self.url.as_str();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(LedgerKind::Postgres)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Some(LedgerKind::Rest)
        } else if url.starts_with("memory://") {
            Some(LedgerKind::Memory)
        } else {
            None
        }
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate ledger configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("LEDGER_URL"));
        }
        let kind = self.kind().ok_or(ValidationError::InvalidLedgerUrl)?;
        if kind == LedgerKind::Rest && self.service_key.is_none() {
            return Err(ValidationError::MissingRequired("LEDGER_SERVICE_KEY"));
        }
        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.request_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}
