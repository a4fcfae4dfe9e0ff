//! Subscription aggregate.
//!
//! One row per purchase attempt. Rows are never deleted; cancellation and
//! expiry are statuses so gateway identifiers are never reused.
//!
//! # Invariants
//!
//! - `final_amount = max(base_amount - discount_amount, 0)`
//! - Status changes only through [`Subscription::transition_to`]
//! - Dates derived during one activation share one timestamp
//! - `version` increases by one on every persisted change

use serde::{Deserialize, Serialize};

use super::pricing::{BillingPeriod, PriceQuote, PricingTier};
use super::status::{IntegrationStatus, SubscriptionStatus};
use crate::domain::foundation::{
    CouponId, Money, StateMachine, SubscriptionId, TierId, Timestamp,
};

/// Result of asking the aggregate to change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    /// Already in the requested status.
    Unchanged,
    /// Not an allowed edge; status left as it was.
    Rejected {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Transition::Rejected { .. })
    }
}

/// Customer-supplied contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: String,
    pub organization_name: String,
    pub contact_name: String,
    pub phone: Option<String>,
}

impl ContactDetails {
    /// Lower-cased, trimmed email used by the duplicate-purchase guard.
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Backend provisioning bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Integration {
    pub status: IntegrationStatus,
    pub organization_id: Option<String>,
    pub tenant_slug: Option<String>,
    /// Raw backend response from the last successful create.
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub updated_at: Option<Timestamp>,
    /// Set while a create request is in flight.
    #[serde(default)]
    pub claimed_at: Option<Timestamp>,
}

/// How long an unreleased provisioning claim blocks other attempts. A claim
/// older than this belongs to a process that died mid-request.
pub const PROVISIONING_CLAIM_SECS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub email: String,
    pub organization_name: String,
    pub contact_name: String,
    pub phone: Option<String>,

    pub tier_id: TierId,
    pub tier_name: String,
    pub billing_period: BillingPeriod,

    pub base_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub coupon_id: Option<CouponId>,
    pub coupon_code: Option<String>,
    /// The checkout's coupon use was handed back after an unpaid exit.
    #[serde(default)]
    pub coupon_released: bool,

    pub status: SubscriptionStatus,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub next_billing_date: Option<Timestamp>,

    pub customer_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub last_invoice_id: Option<String>,
    pub failure_reason: Option<String>,

    pub integration: Integration,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: i64,
}

impl Subscription {
    /// A new `pending` purchase priced by `quote`.
    pub fn new_pending(
        contact: ContactDetails,
        tier: &PricingTier,
        quote: &PriceQuote,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            email: contact.email.trim().to_string(),
            organization_name: contact.organization_name.trim().to_string(),
            contact_name: contact.contact_name.trim().to_string(),
            phone: contact
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            tier_id: tier.id,
            tier_name: tier.name.clone(),
            billing_period: quote.billing_period,
            base_amount: quote.base_amount,
            discount_amount: quote.discount_amount,
            final_amount: quote.base_amount.saturating_sub_floor_zero(quote.discount_amount),
            coupon_id: quote.coupon.as_ref().map(|c| c.id),
            coupon_code: quote.coupon.as_ref().map(|c| c.code.to_string()),
            coupon_released: false,
            status: SubscriptionStatus::Pending,
            start_date: None,
            end_date: None,
            next_billing_date: None,
            customer_id: None,
            checkout_session_id: None,
            payment_intent_id: None,
            gateway_subscription_id: None,
            last_invoice_id: None,
            failure_reason: None,
            integration: Integration::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }

    /// Moves to `target` when the state machine allows it. Never errors.
    pub fn transition_to(&mut self, target: SubscriptionStatus, now: Timestamp) -> Transition {
        let from = self.status;
        if from == target {
            return Transition::Unchanged;
        }
        if !from.can_transition_to(&target) {
            return Transition::Rejected { from, to: target };
        }
        self.status = target;
        self.updated_at = now;
        Transition::Applied { from, to: target }
    }

    /// The coupon use reserved at checkout still has to be handed back: the
    /// purchase ended `expired` or `cancelled` without ever being paid.
    pub fn owes_coupon_release(&self) -> bool {
        self.coupon_id.is_some()
            && !self.coupon_released
            && self.start_date.is_none()
            && matches!(
                self.status,
                SubscriptionStatus::Expired | SubscriptionStatus::Cancelled
            )
    }

    /// Active with a start date: the activation side effects already ran.
    pub fn is_activated(&self) -> bool {
        self.status == SubscriptionStatus::Active && self.start_date.is_some()
    }

    /// Activates and stamps `start_date`, `end_date` and `next_billing_date`
    /// from the single instant `at`.
    pub fn activate(&mut self, at: Timestamp) -> Transition {
        let transition = self.transition_to(SubscriptionStatus::Active, at);
        if transition.is_rejected() {
            return transition;
        }
        if self.start_date.is_none() || transition.is_applied() {
            let period_end = self.billing_period.advance(at);
            self.start_date = Some(at);
            self.end_date = Some(period_end);
            self.next_billing_date = Some(period_end);
            self.failure_reason = None;
            self.updated_at = at;
        }
        transition
    }

    /// Recurring payment received: next charge is one period after `now`.
    pub fn renew(&mut self, now: Timestamp) -> Transition {
        let transition = self.transition_to(SubscriptionStatus::Active, now);
        if transition.is_rejected() {
            return transition;
        }
        if self.start_date.is_none() {
            self.start_date = Some(now);
        }
        let next = self.billing_period.advance(now);
        self.next_billing_date = Some(next);
        self.end_date = Some(next);
        self.failure_reason = None;
        self.updated_at = now;
        transition
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, now: Timestamp) -> Transition {
        let transition = self.transition_to(SubscriptionStatus::Failed, now);
        if !transition.is_rejected() {
            self.failure_reason = Some(reason.into());
        }
        transition
    }

    /// Cancels and stamps `end_date` as `now`.
    pub fn cancel(&mut self, now: Timestamp) -> Transition {
        let transition = self.transition_to(SubscriptionStatus::Cancelled, now);
        if transition.is_applied() {
            self.end_date = Some(now);
        }
        transition
    }

    pub fn record_gateway_ids(
        &mut self,
        customer_id: Option<&str>,
        payment_intent_id: Option<&str>,
        gateway_subscription_id: Option<&str>,
    ) {
        fn set(slot: &mut Option<String>, value: Option<&str>) {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                *slot = Some(v.to_string());
            }
        }
        set(&mut self.customer_id, customer_id);
        set(&mut self.payment_intent_id, payment_intent_id);
        set(&mut self.gateway_subscription_id, gateway_subscription_id);
    }

    // ════════════════════════════════════════════════════════════════
    // Integration
    // ════════════════════════════════════════════════════════════════

    fn set_integration_status(&mut self, target: IntegrationStatus, now: Timestamp) -> bool {
        if !self.integration.status.can_transition_to(&target) {
            return false;
        }
        self.integration.status = target;
        self.integration.updated_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Flips `not_started`/`failed` to `pending`. Returns true when a
    /// provisioning attempt should now be scheduled.
    pub fn begin_provisioning(&mut self, now: Timestamp) -> bool {
        if !self.integration.status.needs_provisioning() {
            return false;
        }
        self.set_integration_status(IntegrationStatus::Pending, now)
    }

    /// Forces `pending` for an operator retry. A completed or cancelled
    /// integration is left alone.
    pub fn reset_provisioning_for_retry(&mut self, now: Timestamp) -> bool {
        match self.integration.status {
            IntegrationStatus::Pending => true,
            IntegrationStatus::NotStarted | IntegrationStatus::Failed => {
                self.integration.error = None;
                self.set_integration_status(IntegrationStatus::Pending, now)
            }
            IntegrationStatus::Completed | IntegrationStatus::Cancelled => false,
        }
    }

    /// Takes the in-flight marker for a create request. Returns false while
    /// another attempt holds a claim younger than [`PROVISIONING_CLAIM_SECS`].
    pub fn claim_provisioning(&mut self, now: Timestamp) -> bool {
        if let Some(claimed) = self.integration.claimed_at {
            if now.duration_since(&claimed).num_seconds() < PROVISIONING_CLAIM_SECS {
                return false;
            }
        }
        self.integration.claimed_at = Some(now);
        self.updated_at = now;
        true
    }

    pub fn has_live_claim(&self, now: Timestamp) -> bool {
        self.integration
            .claimed_at
            .is_some_and(|c| now.duration_since(&c).num_seconds() < PROVISIONING_CLAIM_SECS)
    }

    pub fn record_provisioning_success(
        &mut self,
        organization_id: String,
        tenant_slug: Option<String>,
        data: serde_json::Value,
        now: Timestamp,
    ) {
        if self.integration.status != IntegrationStatus::Pending {
            self.set_integration_status(IntegrationStatus::Pending, now);
        }
        self.set_integration_status(IntegrationStatus::Completed, now);
        self.integration.organization_id = Some(organization_id);
        self.integration.tenant_slug = tenant_slug;
        self.integration.data = Some(data);
        self.integration.error = None;
        self.integration.claimed_at = None;
        self.integration.attempts = self.integration.attempts.saturating_add(1);
    }

    pub fn record_provisioning_failure(&mut self, error: impl Into<String>, now: Timestamp) {
        if self.integration.status != IntegrationStatus::Pending {
            self.set_integration_status(IntegrationStatus::Pending, now);
        }
        self.set_integration_status(IntegrationStatus::Failed, now);
        self.integration.error = Some(error.into());
        self.integration.claimed_at = None;
        self.integration.attempts = self.integration.attempts.saturating_add(1);
    }

    pub fn record_organization_cancelled(&mut self, now: Timestamp) -> bool {
        self.set_integration_status(IntegrationStatus::Cancelled, now)
    }

    pub fn is_provisioned(&self) -> bool {
        self.integration.status == IntegrationStatus::Completed
            && self.integration.organization_id.is_some()
    }
}
