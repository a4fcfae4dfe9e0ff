//! GetSubscriptionStatusHandler - lets the provisioned backend confirm that
//! an organization is still paid for.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingPeriod, IntegrationStatus, SubscriptionStatus,
};
use crate::domain::foundation::{Money, SubscriptionId, Timestamp};
use crate::ports::{SubscriptionLookup, SubscriptionRepository};

/// Exactly one selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatusQuery {
    OrganizationId(String),
    TenantSlug(String),
    /// Most recent subscription for the email.
    Email(String),
}

impl SubscriptionStatusQuery {
    fn lookup(self) -> SubscriptionLookup {
        match self {
            SubscriptionStatusQuery::OrganizationId(v) => SubscriptionLookup::OrganizationId(v),
            SubscriptionStatusQuery::TenantSlug(v) => SubscriptionLookup::TenantSlug(v),
            SubscriptionStatusQuery::Email(v) => SubscriptionLookup::LatestForEmail(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatusView {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionStatus,
    pub is_active: bool,
    pub organization_name: String,
    pub tier: String,
    pub billing_period: BillingPeriod,
    pub amount: Money,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub next_billing_date: Option<Timestamp>,
    pub integration_status: IntegrationStatus,
    pub organization_id: Option<String>,
    pub tenant_slug: Option<String>,
}

pub struct GetSubscriptionStatusHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl GetSubscriptionStatusHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    /// `Ok(None)` when nothing matches.
    pub async fn handle(
        &self,
        query: SubscriptionStatusQuery,
    ) -> Result<Option<SubscriptionStatusView>, BillingError> {
        let Some(sub) = self.subscriptions.find(&query.lookup()).await? else {
            return Ok(None);
        };
        Ok(Some(SubscriptionStatusView {
            subscription_id: sub.id,
            is_active: sub.status == SubscriptionStatus::Active,
            status: sub.status,
            organization_name: sub.organization_name,
            tier: sub.tier_name,
            billing_period: sub.billing_period,
            amount: sub.final_amount,
            start_date: sub.start_date,
            end_date: sub.end_date,
            next_billing_date: sub.next_billing_date,
            integration_status: sub.integration.status,
            organization_id: sub.integration.organization_id,
            tenant_slug: sub.integration.tenant_slug,
        }))
    }
}
