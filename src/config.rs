//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::domain::Currency;

/// Where balances and ledger entries live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store, lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::InvalidValue("STORE_BACKEND")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,

    /// Database connection URL, required for the Postgres backend
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Storefront origin; deposit redirects land on `{frontend_url}/wallet`
    pub frontend_url: String,

    /// Externally reachable origin of this API
    pub public_api_url: String,

    /// Currency every balance is denominated in
    pub wallet_currency: Currency,

    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_base: String,

    pub flw_secret_key: Option<String>,
    pub flw_webhook_hash: Option<String>,
    pub flw_api_base: String,

    /// Upper bound on every outbound provider call
    pub provider_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = optional("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let public_api_url = env::var("PUBLIC_API_URL")
            .unwrap_or_else(|_| format!("http://{host}:{port}"))
            .trim_end_matches('/')
            .to_string();

        let wallet_currency = Currency::parse(
            &env::var("WALLET_CURRENCY").unwrap_or_else(|_| "nzd".to_string()),
        )
        .map_err(|_| ConfigError::InvalidValue("WALLET_CURRENCY"))?;

        let provider_timeout_secs: u64 = env::var("PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PROVIDER_TIMEOUT_SECS"))?;
        if provider_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("PROVIDER_TIMEOUT_SECS"));
        }

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            frontend_url,
            public_api_url,
            wallet_currency,
            stripe_secret_key: optional("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            flw_secret_key: optional("FLW_SECRET_KEY"),
            flw_webhook_hash: optional("FLW_WEBHOOK_HASH"),
            flw_api_base: env::var("FLW_API_BASE")
                .unwrap_or_else(|_| "https://api.flutterwave.com".to_string()),
            provider_timeout_secs,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Where the client lands after a completed deposit
    pub fn deposit_success_url(&self) -> String {
        format!("{}/wallet?payment=successful", self.frontend_url)
    }

    /// Where the client lands after an abandoned or unverified deposit
    pub fn deposit_failure_url(&self) -> String {
        format!("{}/wallet?payment=failed", self.frontend_url)
    }

    /// Redirect target handed to Flutterwave's hosted checkout
    pub fn flutterwave_callback_url(&self) -> String {
        format!(
            "{}/api/v1/deposits/flutterwave/callback",
            self.public_api_url
        )
    }
}

/// Development defaults: in-memory store, no providers
impl Default for Config {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 10,
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: "development".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            public_api_url: "http://127.0.0.1:3000".to_string(),
            wallet_currency: Currency::nzd(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            flw_secret_key: None,
            flw_webhook_hash: None,
            flw_api_base: "https://api.flutterwave.com".to_string(),
            provider_timeout_secs: 15,
        }
    }
}

/// Unset and empty variables both count as absent
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
