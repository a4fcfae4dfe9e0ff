//! Storage for the local checkout-session shadow.

use async_trait::async_trait;

use crate::domain::billing::CheckoutSessionRecord;
use crate::domain::foundation::{DomainError, SubscriptionId};

#[async_trait]
pub trait CheckoutSessionRepository: Send + Sync {
    /// Inserts or replaces by `session_id`.
    async fn save(&self, record: &CheckoutSessionRecord) -> Result<(), DomainError>;

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError>;

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError>;

    /// Newest session created for the subscription.
    async fn find_latest_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError>;
}
