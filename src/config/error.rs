//! Configuration errors.

use thiserror::Error;

/// Loading failed, or the loaded values are unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// A single rejected setting. Variants name the setting so the operator can
/// find it in the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingRequired(&'static str),

    // server
    #[error("server.port must be non-zero")]
    InvalidPort,
    #[error("server.request_timeout_secs must be between 1 and 300")]
    InvalidTimeout,
    #[error("server.host and server.port do not form an address: {0}")]
    InvalidSocketAddr(String),
    #[error("{0} must be an http(s) URL")]
    InvalidUrl(&'static str),
    #[error("{0} must use HTTPS in production")]
    UrlMustBeHttps(&'static str),

    // database
    #[error("database.url must start with postgres:// or postgresql://")]
    InvalidDatabaseUrl,
    #[error("database.min_connections exceeds database.max_connections")]
    InvalidPoolSize,
    #[error("database.max_connections may not exceed 100")]
    PoolSizeTooLarge,

    // payment
    #[error("payment.stripe_api_key must start with sk_ or rk_")]
    InvalidStripeKey,
    #[error("payment.stripe_webhook_secret must start with whsec_")]
    InvalidStripeWebhookSecret,
    #[error("payment.currency must be a lowercase ISO 4217 code, got {0:?}")]
    InvalidCurrency(String),

    // backend and tasks
    #[error("backend.timeout_secs must be between 1 and 300")]
    InvalidBackendTimeout,
    #[error("tasks.workers and tasks.queue_capacity must be at least 1")]
    InvalidTaskPool,
    #[error("tasks retry settings need max_attempts >= 1 and initial_delay <= max_delay")]
    InvalidRetryPolicy,

    // status api
    #[error("status_api.api_token must be at least 16 characters")]
    StatusTokenTooShort,
}
