//! Subscription repository port.
//!
//! # Concurrency
//!
//! - `insert_if_no_open_purchase` runs the open-purchase check and the insert
//!   as one unit serialized per normalized email.
//! - `update` is a compare-and-swap on `version`. A lost race returns
//!   `ErrorCode::ConcurrentModification`; callers re-read and re-apply.

use async_trait::async_trait;

use crate::domain::billing::{IntegrationStatus, Subscription};
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};

/// Outcome of the guarded insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another pending, processing or active purchase exists for the email.
    OpenPurchaseExists(SubscriptionId),
}

/// Ways to find a single subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionLookup {
    Id(SubscriptionId),
    CheckoutSession(String),
    PaymentIntent(String),
    GatewaySubscription(String),
    OrganizationId(String),
    TenantSlug(String),
    /// Most recently created subscription for the email (case-insensitive).
    LatestForEmail(String),
}

/// Integration status breakdown across active subscriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationCounts {
    pub total: u64,
    pub not_started: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl IntegrationCounts {
    pub fn record(&mut self, status: IntegrationStatus) {
        self.total += 1;
        match status {
            IntegrationStatus::NotStarted => self.not_started += 1,
            IntegrationStatus::Pending => self.pending += 1,
            IntegrationStatus::Completed => self.completed += 1,
            IntegrationStatus::Failed => self.failed += 1,
            IntegrationStatus::Cancelled => self.cancelled += 1,
        }
    }

    /// failed / total, zero when there is nothing to measure.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts `subscription` unless the same email already has an open
    /// purchase. Check and insert are atomic with respect to each other.
    async fn insert_if_no_open_purchase(
        &self,
        subscription: &Subscription,
    ) -> Result<InsertOutcome, DomainError>;

    /// Persists `subscription` if its `version` still matches storage, then
    /// bumps `subscription.version`.
    async fn update(&self, subscription: &mut Subscription) -> Result<(), DomainError>;

    async fn find(&self, lookup: &SubscriptionLookup) -> Result<Option<Subscription>, DomainError>;

    /// Active subscriptions whose integration status is in `statuses`,
    /// optionally only those created at or after `created_after`. Oldest first.
    async fn list_active_by_integration(
        &self,
        statuses: &[IntegrationStatus],
        created_after: Option<Timestamp>,
    ) -> Result<Vec<Subscription>, DomainError>;

    async fn integration_counts(&self) -> Result<IntegrationCounts, DomainError>;

    /// Active subscriptions with a failed integration updated since `since`.
    async fn count_failed_integrations_since(&self, since: Timestamp) -> Result<u64, DomainError>;

    /// Pending or processing subscriptions created before `before`.
    async fn count_awaiting_payment_before(&self, before: Timestamp) -> Result<u64, DomainError>;
}
