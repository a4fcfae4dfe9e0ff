//! In-memory subscription store.
//!
//! One async mutex guards the whole map, so the open-purchase check and the
//! insert can never interleave with another insert.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::billing::{IntegrationStatus, Subscription, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::ports::{InsertOutcome, IntegrationCounts, SubscriptionLookup, SubscriptionRepository};

#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionRepository {
    rows: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    /// Stores `subscription` as-is, bypassing the guard and the version check.
    pub async fn put(&self, subscription: Subscription) {
        self.rows.lock().await.insert(subscription.id, subscription);
    }

    pub async fn all(&self) -> Vec<Subscription> {
        self.rows.lock().await.values().cloned().collect()
    }
}

fn matches(sub: &Subscription, lookup: &SubscriptionLookup) -> bool {
    let eq = |field: &Option<String>, value: &str| field.as_deref() == Some(value);
    match lookup {
        SubscriptionLookup::Id(id) => sub.id == *id,
        SubscriptionLookup::CheckoutSession(v) => eq(&sub.checkout_session_id, v),
        SubscriptionLookup::PaymentIntent(v) => eq(&sub.payment_intent_id, v),
        SubscriptionLookup::GatewaySubscription(v) => eq(&sub.gateway_subscription_id, v),
        SubscriptionLookup::OrganizationId(v) => eq(&sub.integration.organization_id, v),
        SubscriptionLookup::TenantSlug(v) => eq(&sub.integration.tenant_slug, v),
        SubscriptionLookup::LatestForEmail(email) => {
            sub.normalized_email() == email.trim().to_lowercase()
        }
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert_if_no_open_purchase(
        &self,
        subscription: &Subscription,
    ) -> Result<InsertOutcome, DomainError> {
        let mut rows = self.rows.lock().await;
        let email = subscription.normalized_email();
        if let Some(existing) = rows
            .values()
            .filter(|s| s.normalized_email() == email && s.status.is_open_purchase())
            .max_by_key(|s| s.created_at)
        {
            return Ok(InsertOutcome::OpenPurchaseExists(existing.id));
        }
        rows.insert(subscription.id, subscription.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn update(&self, subscription: &mut Subscription) -> Result<(), DomainError> {
        let mut rows = self.rows.lock().await;
        let stored = rows.get_mut(&subscription.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("subscription {} not found", subscription.id),
            )
        })?;
        if stored.version != subscription.version {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!("subscription {} was modified concurrently", subscription.id),
            ));
        }
        subscription.version += 1;
        *stored = subscription.clone();
        Ok(())
    }

    async fn find(&self, lookup: &SubscriptionLookup) -> Result<Option<Subscription>, DomainError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|s| matches(s, lookup))
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn list_active_by_integration(
        &self,
        statuses: &[IntegrationStatus],
        created_after: Option<Timestamp>,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows = self.rows.lock().await;
        let mut found: Vec<Subscription> = rows
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter(|s| statuses.contains(&s.integration.status))
            .filter(|s| created_after.map_or(true, |after| !s.created_at.is_before(&after)))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn integration_counts(&self) -> Result<IntegrationCounts, DomainError> {
        let rows = self.rows.lock().await;
        let mut counts = IntegrationCounts::default();
        for sub in rows.values().filter(|s| s.status == SubscriptionStatus::Active) {
            counts.record(sub.integration.status);
        }
        Ok(counts)
    }

    async fn count_failed_integrations_since(&self, since: Timestamp) -> Result<u64, DomainError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter(|s| s.integration.status == IntegrationStatus::Failed)
            .filter(|s| !s.updated_at.is_before(&since))
            .count() as u64)
    }

    async fn count_awaiting_payment_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|s| s.status.is_awaiting_payment())
            .filter(|s| s.created_at.is_before(&before))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::test_support::pending_subscription;

    #[tokio::test]
    async fn guard_rejects_second_open_purchase_case_insensitively() {
        let repo = InMemorySubscriptionRepository::new();
        let first = pending_subscription("pat@grace.org");
        let second = pending_subscription("  PAT@Grace.org ");

        assert_eq!(
            repo.insert_if_no_open_purchase(&first).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            repo.insert_if_no_open_purchase(&second).await.unwrap(),
            InsertOutcome::OpenPurchaseExists(first.id)
        );
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn guard_allows_new_purchase_after_failure() {
        let repo = InMemorySubscriptionRepository::new();
        let mut first = pending_subscription("pat@grace.org");
        repo.insert_if_no_open_purchase(&first).await.unwrap();
        first.mark_failed("declined", Timestamp::now());
        repo.update(&mut first).await.unwrap();

        let second = pending_subscription("pat@grace.org");
        assert_eq!(
            repo.insert_if_no_open_purchase(&second).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn concurrent_guarded_inserts_admit_exactly_one() {
        let repo = InMemorySubscriptionRepository::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let sub = pending_subscription("race@grace.org");
                repo.insert_if_no_open_purchase(&sub).await.unwrap()
            }));
        }
        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap() == InsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        let sub = pending_subscription("a@b.org");
        repo.insert_if_no_open_purchase(&sub).await.unwrap();

        let mut a = sub.clone();
        let mut b = sub.clone();
        repo.update(&mut a).await.unwrap();
        assert_eq!(a.version, 1);

        let err = repo.update(&mut b).await.unwrap_err();
        assert!(err.is_concurrent_modification());
    }

    #[tokio::test]
    async fn find_by_gateway_identifiers() {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = pending_subscription("a@b.org");
        sub.checkout_session_id = Some("cs_1".into());
        sub.record_gateway_ids(Some("cus_1"), Some("pi_1"), None);
        repo.put(sub.clone()).await;

        let by_session = repo
            .find(&SubscriptionLookup::CheckoutSession("cs_1".into()))
            .await
            .unwrap();
        assert_eq!(by_session.map(|s| s.id), Some(sub.id));

        let by_pi = repo
            .find(&SubscriptionLookup::PaymentIntent("pi_1".into()))
            .await
            .unwrap();
        assert_eq!(by_pi.map(|s| s.id), Some(sub.id));

        assert!(repo
            .find(&SubscriptionLookup::PaymentIntent("pi_other".into()))
            .await
            .unwrap()
            .is_none());
    }
}
