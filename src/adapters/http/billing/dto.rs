//! Request and response bodies for the billing endpoints.
//!
//! Amounts are integer cents.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    CancelPendingCheckoutResult, CreateCheckoutResult, ProcessWebhookResult, ValidateCouponResult,
};
use crate::application::handlers::provisioning::ProvisioningOutcome;
use crate::domain::billing::{PricingTier, SubscriptionStatus};
use crate::domain::foundation::{Money, SubscriptionId, TierId};

// ════════════════════════════════════════════════════════════════════════════════
// Catalog
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierResponse {
    pub id: TierId,
    pub name: String,
    pub slug: String,
    pub description: String,
    /// Zero means unlimited.
    pub max_users: u32,
    pub monthly_price: Money,
    pub annual_price: Option<Money>,
    pub annual_savings: Option<Money>,
    pub features: Vec<String>,
    pub is_popular: bool,
}

impl From<PricingTier> for TierResponse {
    fn from(tier: PricingTier) -> Self {
        Self {
            annual_savings: tier.annual_savings(),
            id: tier.id,
            name: tier.name,
            slug: tier.slug,
            description: tier.description,
            max_users: tier.max_users,
            monthly_price: tier.monthly_price,
            annual_price: tier.annual_price,
            features: tier.features,
            is_popular: tier.is_popular,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateCouponRequest {
    #[serde(default)]
    pub coupon_code: String,
    /// Kept as text so a malformed id reads as an invalid coupon, not a 400.
    pub tier_id: String,
    pub billing_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub message: String,
    pub discount_amount: Money,
    pub final_price: Money,
}

impl From<ValidateCouponResult> for ValidateCouponResponse {
    fn from(result: ValidateCouponResult) -> Self {
        Self {
            valid: result.valid,
            message: result.message,
            discount_amount: result.discount_amount,
            final_price: result.final_price,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    pub tier_id: TierId,
    /// `monthly` or `annual`; anything else is treated as monthly.
    pub billing_period: Option<String>,
    pub coupon_code: Option<String>,
    pub email: String,
    pub church_name: String,
    pub contact_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub subscription_id: SubscriptionId,
    pub checkout_url: String,
    pub session_id: String,
    pub billing_period: String,
    pub base_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_message: Option<String>,
}

impl From<CreateCheckoutResult> for CheckoutResponse {
    fn from(result: CreateCheckoutResult) -> Self {
        Self {
            subscription_id: result.subscription_id,
            checkout_url: result.checkout_url,
            session_id: result.session_id,
            billing_period: result.quote.billing_period.as_str().to_string(),
            base_amount: result.quote.base_amount,
            discount_amount: result.quote.discount_amount,
            final_amount: result.quote.final_amount,
            coupon_code: result.quote.coupon.map(|c| c.code.as_str().to_string()),
            coupon_message: result.coupon_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCheckoutResponse {
    pub subscription_id: SubscriptionId,
    pub cancelled: bool,
    pub status: SubscriptionStatus,
}

impl CancelCheckoutResponse {
    pub fn new(subscription_id: SubscriptionId, result: CancelPendingCheckoutResult) -> Self {
        match result {
            CancelPendingCheckoutResult::Cancelled => Self {
                subscription_id,
                cancelled: true,
                status: SubscriptionStatus::Cancelled,
            },
            CancelPendingCheckoutResult::NotCancellable { status } => Self {
                subscription_id,
                cancelled: false,
                status,
            },
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub event_id: String,
    /// `processed`, `duplicate` or `in_flight`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl From<ProcessWebhookResult> for WebhookResponse {
    fn from(result: ProcessWebhookResult) -> Self {
        let event_id = result.event_id().to_string();
        let (status, outcome) = match result {
            ProcessWebhookResult::Processed { outcome, .. } => {
                ("processed", Some(outcome.to_string()))
            }
            ProcessWebhookResult::Duplicate { .. } => ("duplicate", None),
            ProcessWebhookResult::InFlight { .. } => ("in_flight", None),
        };
        Self {
            received: true,
            event_id,
            status: status.to_string(),
            outcome,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Backend-facing subscription endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// Exactly one selector must be present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionStatusParams {
    pub organization_id: Option<String>,
    pub tenant_slug: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSubscriptionResponse {
    pub subscription_id: SubscriptionId,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryIntegrationResponse {
    pub subscription_id: SubscriptionId,
    /// `created`, `already_provisioned` or `not_eligible`.
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RetryIntegrationResponse {
    pub fn new(subscription_id: SubscriptionId, outcome: ProvisioningOutcome) -> Self {
        let base = Self {
            subscription_id,
            result: String::new(),
            organization_id: None,
            tenant_slug: None,
            reason: None,
        };
        match outcome {
            ProvisioningOutcome::Created {
                organization_id,
                tenant_slug,
            } => Self {
                result: "created".into(),
                organization_id: Some(organization_id),
                tenant_slug,
                ..base
            },
            ProvisioningOutcome::AlreadyProvisioned { organization_id } => Self {
                result: "already_provisioned".into(),
                organization_id: Some(organization_id),
                ..base
            },
            ProvisioningOutcome::NotEligible { reason } => Self {
                result: "not_eligible".into(),
                reason: Some(reason),
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::test_support::tier;
    use crate::domain::billing::ReconcileOutcome;

    #[test]
    fn tier_response_includes_annual_savings() {
        let response = TierResponse::from(tier("Growth", 5_000, Some(50_000)));
        assert_eq!(response.annual_savings, Some(Money::from_cents(10_000)));
    }

    #[test]
    fn webhook_response_reports_outcome_label() {
        let response = WebhookResponse::from(ProcessWebhookResult::Processed {
            event_id: "evt_1".into(),
            outcome: ReconcileOutcome::Activated,
        });
        assert_eq!(response.status, "processed");
        assert_eq!(response.outcome.as_deref(), Some("activated"));

        let duplicate = WebhookResponse::from(ProcessWebhookResult::Duplicate {
            event_id: "evt_1".into(),
        });
        assert_eq!(duplicate.status, "duplicate");
        assert!(serde_json::to_string(&duplicate).unwrap().find("outcome").is_none());
    }

    #[test]
    fn create_checkout_request_accepts_missing_optionals() {
        let request: CreateCheckoutRequest = serde_json::from_value(serde_json::json!({
            "tier_id": TierId::new(),
            "email": "pat@grace.org",
            "church_name": "Grace Chapel",
            "contact_name": "Pat"
        }))
        .unwrap();
        assert!(request.billing_period.is_none());
        assert!(request.coupon_code.is_none());
    }

    #[test]
    fn retry_response_not_eligible_carries_reason() {
        let id = SubscriptionId::new();
        let response = RetryIntegrationResponse::new(
            id,
            ProvisioningOutcome::NotEligible {
                reason: "subscription is pending".into(),
            },
        );
        assert_eq!(response.result, "not_eligible");
        assert_eq!(response.reason.as_deref(), Some("subscription is pending"));
    }
}
