use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::billing::{ReconcileOutcome, WebhookEventRecord};
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};
use crate::ports::{ClaimOutcome, WebhookEventRepository};

#[derive(Debug, Clone, Default)]
pub struct InMemoryWebhookEventRepository {
    events: Arc<Mutex<HashMap<String, WebhookEventRecord>>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Stores `record` verbatim. Lets tests stage stale claims.
    pub async fn put(&self, record: WebhookEventRecord) {
        self.events
            .lock()
            .await
            .insert(record.event_id.clone(), record);
    }
}

fn lease_expired(claimed_at: Option<Timestamp>, lease: Duration, now: Timestamp) -> bool {
    match claimed_at {
        None => true,
        Some(at) => {
            let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero());
            now.duration_since(&at) >= lease
        }
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn claim(
        &self,
        record: &WebhookEventRecord,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        let now = Timestamp::now();
        let mut events = self.events.lock().await;
        let row = events
            .entry(record.event_id.clone())
            .or_insert_with(|| record.clone());

        if row.processed {
            return Ok(ClaimOutcome::AlreadyProcessed);
        }
        if !lease_expired(row.claimed_at, lease, now) {
            return Ok(ClaimOutcome::InFlight);
        }
        row.claimed_at = Some(now);
        row.attempts = row.attempts.saturating_add(1);
        Ok(ClaimOutcome::Claimed)
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        subscription_id: Option<SubscriptionId>,
        outcome: &ReconcileOutcome,
    ) -> Result<(), DomainError> {
        if let Some(row) = self.events.lock().await.get_mut(event_id) {
            row.processed = true;
            row.processed_at = Some(Timestamp::now());
            row.processing_error = None;
            row.outcome = Some(outcome.to_string());
            row.claimed_at = None;
            if subscription_id.is_some() {
                row.subscription_id = subscription_id;
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        if let Some(row) = self.events.lock().await.get_mut(event_id) {
            row.processing_error = Some(error.to_string());
            row.claimed_at = None;
        }
        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.events.lock().await.get(event_id).cloned())
    }

    async fn count_failures_since(&self, since: Timestamp) -> Result<u64, DomainError> {
        Ok(self
            .events
            .lock()
            .await
            .values()
            .filter(|e| e.processing_error.is_some() && !e.received_at.is_before(&since))
            .count() as u64)
    }

    async fn purge_processed_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let mut events = self.events.lock().await;
        let start = events.len();
        events.retain(|_, e| !(e.processed && e.received_at.is_before(&before)));
        Ok((start - events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::DEFAULT_CLAIM_LEASE;

    fn record(id: &str) -> WebhookEventRecord {
        WebhookEventRecord::received(id, "invoice.paid", serde_json::json!({}), Timestamp::now())
    }

    #[tokio::test]
    async fn second_delivery_while_claimed_is_in_flight() {
        let repo = InMemoryWebhookEventRepository::new();
        assert_eq!(
            repo.claim(&record("evt_1"), DEFAULT_CLAIM_LEASE).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            repo.claim(&record("evt_1"), DEFAULT_CLAIM_LEASE).await.unwrap(),
            ClaimOutcome::InFlight
        );
    }

    #[tokio::test]
    async fn processed_event_is_duplicate() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(&record("evt_1"), DEFAULT_CLAIM_LEASE).await.unwrap();
        repo.mark_processed("evt_1", None, &ReconcileOutcome::Renewed)
            .await
            .unwrap();
        assert_eq!(
            repo.claim(&record("evt_1"), DEFAULT_CLAIM_LEASE).await.unwrap(),
            ClaimOutcome::AlreadyProcessed
        );
        let stored = repo.find("evt_1").await.unwrap().unwrap();
        assert_eq!(stored.outcome.as_deref(), Some("renewed"));
    }

    #[tokio::test]
    async fn failure_releases_claim_for_retry() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(&record("evt_1"), DEFAULT_CLAIM_LEASE).await.unwrap();
        repo.mark_failed("evt_1", "db down").await.unwrap();

        assert_eq!(
            repo.claim(&record("evt_1"), DEFAULT_CLAIM_LEASE).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(repo.find("evt_1").await.unwrap().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn expired_lease_can_be_reclaimed() {
        let repo = InMemoryWebhookEventRepository::new();
        let mut stale = record("evt_1");
        stale.claimed_at = Some(Timestamp::now().minus_hours(1));
        repo.put(stale).await;

        assert_eq!(
            repo.claim(&record("evt_1"), DEFAULT_CLAIM_LEASE).await.unwrap(),
            ClaimOutcome::Claimed
        );
    }

    #[tokio::test]
    async fn purge_only_removes_old_processed_rows() {
        let repo = InMemoryWebhookEventRepository::new();
        let mut old = record("evt_old");
        old.received_at = Timestamp::now().minus_days(40);
        old.processed = true;
        repo.put(old).await;
        let mut old_unprocessed = record("evt_stuck");
        old_unprocessed.received_at = Timestamp::now().minus_days(40);
        repo.put(old_unprocessed).await;
        repo.put(record("evt_new")).await;

        let removed = repo
            .purge_processed_before(Timestamp::now().minus_days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.len().await, 2);
    }
}
