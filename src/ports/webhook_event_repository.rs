//! WebhookEventRepository port - the idempotency anchor for reconciliation.
//!
//! Stripe may deliver the same event several times and may deliver two
//! copies at once. `claim` decides, atomically, which delivery gets to run
//! the handlers:
//!
//! - first sighting inserts the row and claims it
//! - a processed row short-circuits as a duplicate
//! - a row claimed by someone else within the lease is "in flight"; the
//!   caller acknowledges without processing
//! - an unprocessed row whose lease expired (crashed worker, or a previous
//!   failure that released it) is claimed again

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::billing::{ReconcileOutcome, WebhookEventRecord};
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};

/// How long a claim protects an event from concurrent processing.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyProcessed,
    InFlight,
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Inserts the event if unseen, then tries to take the processing lease.
    async fn claim(
        &self,
        record: &WebhookEventRecord,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError>;

    /// Marks the event processed and releases the lease.
    async fn mark_processed(
        &self,
        event_id: &str,
        subscription_id: Option<SubscriptionId>,
        outcome: &ReconcileOutcome,
    ) -> Result<(), DomainError>;

    /// Records the error and releases the lease so a redelivery can retry.
    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError>;

    async fn find(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Events with a processing error received since `since`.
    async fn count_failures_since(&self, since: Timestamp) -> Result<u64, DomainError>;

    /// Deletes processed events received before `before`. Returns rows removed.
    async fn purge_processed_before(&self, before: Timestamp) -> Result<u64, DomainError>;
}
