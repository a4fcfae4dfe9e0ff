//! GetCheckoutStatusHandler - what the success page polls after redirect.
//!
//! Local state is authoritative; the gateway is only asked about the
//! session while the purchase is still unpaid, so the page can tell
//! "paid, waiting for the webhook" apart from "not paid".

use serde::Serialize;
use std::sync::Arc;

use crate::domain::billing::{BillingError, IntegrationStatus, SubscriptionStatus};
use crate::domain::foundation::{Money, SubscriptionId};
use crate::ports::{PaymentGateway, SubscriptionLookup, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct GetCheckoutStatusQuery {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutStatusView {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionStatus,
    pub organization_name: String,
    pub tier: String,
    pub final_amount: Money,
    /// Gateway `payment_status` while unpaid, when it could be fetched.
    pub payment_status: Option<String>,
    pub integration_status: IntegrationStatus,
    pub tenant_slug: Option<String>,
    pub failure_reason: Option<String>,
}

pub struct GetCheckoutStatusHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl GetCheckoutStatusHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        query: GetCheckoutStatusQuery,
    ) -> Result<CheckoutStatusView, BillingError> {
        let id = query.subscription_id;
        let sub = self
            .subscriptions
            .find(&SubscriptionLookup::Id(id))
            .await?
            .ok_or(BillingError::SubscriptionNotFound(id))?;

        let mut payment_status = None;
        if sub.status.is_awaiting_payment() {
            if let Some(session_id) = sub.checkout_session_id.as_deref() {
                match self.gateway.retrieve_checkout_session(session_id).await {
                    Ok(Some(session)) => payment_status = session.payment_status,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(subscription_id = %id, error = %e, "Could not retrieve checkout session");
                    }
                }
            }
        }

        Ok(CheckoutStatusView {
            subscription_id: sub.id,
            status: sub.status,
            organization_name: sub.organization_name,
            tier: sub.tier_name,
            final_amount: sub.final_amount,
            payment_status,
            integration_status: sub.integration.status,
            tenant_slug: sub.integration.tenant_slug,
            failure_reason: sub.failure_reason,
        })
    }
}
