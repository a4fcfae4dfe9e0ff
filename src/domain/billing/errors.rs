//! Billing error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | TierNotFound / TierInactive | 400 |
//! | SubscriptionNotFound | 404 |
//! | ExistingSubscription | 409 |
//! | InvalidState | 409 |
//! | PaymentGateway | 502 |
//! | Infrastructure | 500 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, TierId, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Pricing tier not found: {0}")]
    TierNotFound(TierId),

    #[error("Pricing tier '{0}' is not available")]
    TierInactive(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    /// The customer already has a pending, processing or active purchase.
    #[error("An existing subscription is already in progress or active for this email")]
    ExistingSubscription { existing: SubscriptionId },

    #[error("Cannot {attempted} a subscription that is {current}")]
    InvalidState { current: String, attempted: String },

    /// The gateway refused or could not be reached. Detail is for logs only.
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Error: {0}")]
    Infrastructure(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::Validation { .. } => ErrorCode::ValidationFailed,
            BillingError::TierNotFound(_) | BillingError::TierInactive(_) => ErrorCode::TierNotFound,
            BillingError::SubscriptionNotFound(_) => ErrorCode::SubscriptionNotFound,
            BillingError::ExistingSubscription { .. } => ErrorCode::DuplicatePurchase,
            BillingError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            BillingError::PaymentGateway(_) => ErrorCode::ExternalServiceError,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Message safe to show a customer.
    pub fn user_message(&self) -> String {
        match self {
            BillingError::PaymentGateway(_) => {
                "We couldn't start the payment. Please try again.".to_string()
            }
            BillingError::Infrastructure(_) => "An unexpected error occurred.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => BillingError::Validation {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::validation(err.field().to_string(), err.to_string())
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
