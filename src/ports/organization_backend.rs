//! Port for the external organization-provisioning backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::billing::Subscription;
use crate::domain::foundation::SubscriptionId;

/// Payload for creating the customer's organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub subscription_tier: String,
    pub billing_period: String,
    /// Decimal dollars, as the backend expects.
    pub subscription_amount: f64,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub marketing_subscription_id: SubscriptionId,
}

impl CreateOrganizationRequest {
    pub fn from_subscription(sub: &Subscription) -> Self {
        Self {
            name: sub.organization_name.clone(),
            contact_name: sub.contact_name.clone(),
            contact_email: sub.email.clone(),
            contact_phone: sub.phone.clone().unwrap_or_default(),
            subscription_tier: sub.tier_name.clone(),
            billing_period: sub.billing_period.to_string(),
            subscription_amount: sub.final_amount.as_dollars_f64(),
            stripe_customer_id: sub.customer_id.clone().unwrap_or_default(),
            stripe_subscription_id: sub.gateway_subscription_id.clone().unwrap_or_default(),
            marketing_subscription_id: sub.id,
        }
    }
}

/// What the backend returned for a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrganization {
    pub organization_id: String,
    pub tenant_slug: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Any status other than 200/201. `body` is truncated.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    /// 2xx but not the JSON we need.
    #[error("Invalid JSON response: {0}")]
    MalformedResponse(String),

    #[error("Backend integration is disabled")]
    Disabled,
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout | BackendError::Connection(_) => true,
            BackendError::Http { status, .. } => *status >= 500 || *status == 429,
            BackendError::MalformedResponse(_) | BackendError::Disabled => false,
        }
    }
}

#[async_trait]
pub trait OrganizationBackend: Send + Sync {
    async fn create_organization(
        &self,
        request: &CreateOrganizationRequest,
    ) -> Result<CreatedOrganization, BackendError>;

    async fn get_organization_status(
        &self,
        organization_id: &str,
    ) -> Result<serde_json::Value, BackendError>;

    /// PATCHes the organization's subscription status.
    async fn update_subscription_status(
        &self,
        organization_id: &str,
        status: &str,
        subscription_data: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError>;

    async fn cancel_organization(
        &self,
        organization_id: &str,
        subscription_id: &SubscriptionId,
    ) -> Result<serde_json::Value, BackendError>;

    /// Calls the health endpoint.
    async fn test_connection(&self) -> Result<serde_json::Value, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::test_support::pending_subscription;

    #[test]
    fn request_copies_subscription_fields() {
        let mut sub = pending_subscription("pat@grace.org");
        sub.customer_id = Some("cus_1".into());
        let req = CreateOrganizationRequest::from_subscription(&sub);

        assert_eq!(req.name, "Grace Fellowship");
        assert_eq!(req.contact_email, "pat@grace.org");
        assert_eq!(req.subscription_tier, "Growth");
        assert_eq!(req.billing_period, "monthly");
        assert!((req.subscription_amount - 25.0).abs() < f64::EPSILON);
        assert_eq!(req.stripe_customer_id, "cus_1");
        assert_eq!(req.stripe_subscription_id, "");
        assert_eq!(req.marketing_subscription_id, sub.id);
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(BackendError::Http { status: 503, body: String::new() }.is_transient());
        assert!(!BackendError::Http { status: 400, body: String::new() }.is_transient());
        assert!(BackendError::Timeout.is_transient());
    }

    #[test]
    fn http_error_message_format() {
        let err = BackendError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }
}
