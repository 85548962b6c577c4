//! Basket engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `BASKET_STORAGE_KEY` - Key the basket snapshot is stored under (default: `cmsg:basket`)
//! - `BASKET_STORAGE_DIR` - Directory for durable file storage (default: in-memory)
//! - `BASKET_EVENT_CAPACITY` - Cross-context change buffer per context (default: 64)
//! - `BASKET_CHANGE_CAPACITY` - Local change-notification buffer (default: 32)
//! - `BASKET_ECHO_POLICY` - `siblings` or `all` (default: `siblings`)
//! - `BASKET_CURRENCY` - Display currency, ISO code (default: `GBP`)

use std::path::PathBuf;

use cmsg_core::CurrencyCode;
use thiserror::Error;

use crate::channel::EchoPolicy;

/// Default storage key, shared by every context of a profile.
pub const DEFAULT_STORAGE_KEY: &str = "cmsg:basket";

const DEFAULT_EVENT_CAPACITY: usize = 64;
const DEFAULT_CHANGE_CAPACITY: usize = 32;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Basket engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketConfig {
    /// Key the basket snapshot is stored under
    pub storage_key: String,
    /// Directory for the file backend; `None` selects in-memory storage
    pub storage_dir: Option<PathBuf>,
    /// Cross-context events a context may fall behind by
    pub event_capacity: usize,
    /// Local change notifications a view may fall behind by
    pub change_capacity: usize,
    /// Whether a local write is echoed back to the writer
    pub echo: EchoPolicy,
    /// Currency used when formatting prices
    pub currency: CurrencyCode,
}

impl Default for BasketConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            change_capacity: DEFAULT_CHANGE_CAPACITY,
            echo: EchoPolicy::default(),
            currency: CurrencyCode::default(),
        }
    }
}

impl BasketConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let storage_key = lookup("BASKET_STORAGE_KEY")
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(defaults.storage_key);
        let storage_dir = lookup("BASKET_STORAGE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        let event_capacity = parse_capacity(
            "BASKET_EVENT_CAPACITY",
            lookup("BASKET_EVENT_CAPACITY"),
            defaults.event_capacity,
        )?;
        let change_capacity = parse_capacity(
            "BASKET_CHANGE_CAPACITY",
            lookup("BASKET_CHANGE_CAPACITY"),
            defaults.change_capacity,
        )?;
        let echo = match lookup("BASKET_ECHO_POLICY") {
            Some(value) => EchoPolicy::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "BASKET_ECHO_POLICY".to_string(),
                    format!("expected 'siblings' or 'all', got '{value}'"),
                )
            })?,
            None => defaults.echo,
        };
        let currency = match lookup("BASKET_CURRENCY") {
            Some(value) => CurrencyCode::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "BASKET_CURRENCY".to_string(),
                    format!("unsupported currency '{value}'"),
                )
            })?,
            None => defaults.currency,
        };

        Ok(Self {
            storage_key,
            storage_dir,
            event_capacity,
            change_capacity,
            echo,
            currency,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a positive buffer capacity, falling back to a default when unset.
fn parse_capacity(key: &str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        )),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}
