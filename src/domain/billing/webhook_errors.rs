//! Webhook error types for Stripe webhook handling.
//!
//! Status mapping drives Stripe's redelivery: anything 4xx is final, 5xx
//! is retried later.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    /// Older than the replay window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Further in the future than the clock-skew allowance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Event livemode does not match this deployment")]
    LivemodeMismatch,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Local storage failed while reconciling.
    #[error("Database error: {0}")]
    Database(String),

    /// A handler failed for a reason other than storage.
    #[error("Handler failed: {0}")]
    Handler(String),
}

impl WebhookError {
    /// True when the event should be redelivered.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_) | WebhookError::Handler(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::LivemodeMismatch
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::Database(_) | WebhookError::Handler(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine code for response bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "MISSING_SIGNATURE",
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp => "INVALID_SIGNATURE",
            WebhookError::ParseError(_) | WebhookError::MissingField(_) => "INVALID_PAYLOAD",
            WebhookError::LivemodeMismatch => "LIVEMODE_MISMATCH",
            WebhookError::Database(_) | WebhookError::Handler(_) => "PROCESSING_FAILED",
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}
