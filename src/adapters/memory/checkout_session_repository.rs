use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::CheckoutSessionRecord;
use crate::domain::foundation::{DomainError, SubscriptionId};
use crate::ports::CheckoutSessionRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckoutSessionRepository {
    sessions: Arc<RwLock<HashMap<String, CheckoutSessionRecord>>>,
}

impl InMemoryCheckoutSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckoutSessionRepository for InMemoryCheckoutSessionRepository {
    async fn save(&self, record: &CheckoutSessionRecord) -> Result<(), DomainError> {
        self.sessions
            .write()
            .await
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn find_latest_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.subscription_id == *subscription_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }
}
