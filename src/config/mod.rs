//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `CHURCH_BILLING` prefix
//! and `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use church_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod backend;
mod database;
mod error;
mod payment;
mod server;
mod status_api;
mod tasks;

pub use backend::BackendConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};
pub use status_api::StatusApiConfig;
pub use tasks::{DispatchMode, TasksConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL connection
    pub database: DatabaseConfig,

    /// Stripe keys and checkout redirects
    pub payment: PaymentConfig,

    /// Church directory backend used for provisioning
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub status_api: StatusApiConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads `CHURCH_BILLING__*` variables:
    ///
    /// - `CHURCH_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `CHURCH_BILLING__PAYMENT__STRIPE_WEBHOOK_SECRET=...` -> `payment.stripe_webhook_secret`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHURCH_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section. Production additionally
    /// requires HTTPS URLs and a status API token.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let production = self.is_production();
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate(production)?;
        self.backend.validate(production)?;
        self.tasks.validate()?;
        self.status_api.validate(production)?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

pub(crate) fn check_url(
    field: &'static str,
    url: &str,
    production: bool,
) -> Result<(), ValidationError> {
    if url.starts_with("https://") {
        Ok(())
    } else if url.starts_with("http://") {
        if production {
            Err(ValidationError::UrlMustBeHttps(field))
        } else {
            Ok(())
        }
    } else {
        Err(ValidationError::InvalidUrl(field))
    }
}
