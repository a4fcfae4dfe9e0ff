//! Error responses for the HTTP adapter.
//!
//! Client errors carry the error's own message. Infrastructure failures are
//! logged with a short correlation id and the caller only sees that id.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingError, WebhookError};
use crate::domain::foundation::{DomainError, ErrorCode};

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `DUPLICATE_PURCHASE`.
    pub error: String,
    pub message: String,
    /// Correlation id for server-side failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            error_id: None,
        }
    }
}

/// First eight characters of a fresh v4 UUID.
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[derive(Debug)]
pub enum ApiError {
    Billing(BillingError),
    Webhook(WebhookError),
    Domain(DomainError),
    BadRequest(String),
    Unauthorized,
    NotFound(String),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self::Billing(err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self::Webhook(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

fn internal(code: impl std::fmt::Display, detail: &str) -> (StatusCode, ErrorResponse) {
    with_reference(StatusCode::INTERNAL_SERVER_ERROR, code, detail)
}

fn with_reference(
    status: StatusCode,
    code: impl std::fmt::Display,
    detail: &str,
) -> (StatusCode, ErrorResponse) {
    let error_id = correlation_id();
    tracing::error!(%error_id, %status, error = %detail, "Request failed");
    (
        status,
        ErrorResponse {
            error: code.to_string(),
            message: format!(
                "An unexpected error occurred. Reference: {}",
                error_id
            ),
            error_id: Some(error_id),
        },
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Billing(err) => {
                let status = match &err {
                    BillingError::Validation { .. }
                    | BillingError::TierNotFound(_)
                    | BillingError::TierInactive(_) => StatusCode::BAD_REQUEST,
                    BillingError::SubscriptionNotFound(_) => StatusCode::NOT_FOUND,
                    BillingError::ExistingSubscription { .. }
                    | BillingError::InvalidState { .. } => StatusCode::CONFLICT,
                    BillingError::PaymentGateway(detail) => {
                        let (status, mut body) =
                            with_reference(StatusCode::BAD_GATEWAY, err.code(), detail);
                        body.message = err.user_message();
                        return (status, Json(body)).into_response();
                    }
                    BillingError::Infrastructure(detail) => {
                        let (status, body) = internal(err.code(), detail);
                        return (status, Json(body)).into_response();
                    }
                };
                (status, ErrorResponse::new(err.code().to_string(), err.user_message()))
            }
            ApiError::Webhook(err) => {
                if err.is_retryable() {
                    internal(err.code(), &err.to_string())
                } else {
                    tracing::warn!(error = %err, "Rejected webhook delivery");
                    (err.status_code(), ErrorResponse::new(err.code(), err.to_string()))
                }
            }
            ApiError::Domain(err) => match err.code {
                ErrorCode::ValidationFailed
                | ErrorCode::EmptyField
                | ErrorCode::OutOfRange
                | ErrorCode::InvalidFormat => (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(err.code.to_string(), err.message()),
                ),
                ErrorCode::NotFound | ErrorCode::SubscriptionNotFound => (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::new(err.code.to_string(), err.message()),
                ),
                ErrorCode::ExternalServiceError => {
                    with_reference(StatusCode::BAD_GATEWAY, err.code, &err.to_string())
                }
                code => internal(code, &err.to_string()),
            },
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(ErrorCode::ValidationFailed.to_string(), message),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(ErrorCode::Unauthorized.to_string(), "Unauthorized"),
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(ErrorCode::NotFound.to_string(), message),
            ),
        };
        (status, Json(body)).into_response()
    }
}
