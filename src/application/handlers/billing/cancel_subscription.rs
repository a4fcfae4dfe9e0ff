//! CancelSubscriptionHandler - ends a paid subscription on request.
//!
//! The recurring charge is stopped at the gateway first; local state only
//! changes once the gateway agreed. Organization teardown is handed to the
//! task dispatcher.

use std::sync::Arc;

use crate::application::handlers::versioned_update::{modify_subscription, Change};
use crate::domain::billing::{BillingError, SubscriptionStatus, Transition};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    PaymentGateway, ProvisioningTask, SubscriptionLookup, SubscriptionRepository, TaskDispatcher,
};

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSubscriptionResult {
    pub subscription_id: SubscriptionId,
    /// False when it was already cancelled.
    pub cancelled: bool,
}

pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            dispatcher,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let id = cmd.subscription_id;
        let lookup = SubscriptionLookup::Id(id);
        let current = self
            .subscriptions
            .find(&lookup)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(id))?;

        match current.status {
            SubscriptionStatus::Cancelled => {
                return Ok(CancelSubscriptionResult {
                    subscription_id: id,
                    cancelled: false,
                })
            }
            SubscriptionStatus::Active | SubscriptionStatus::Suspended => {}
            other => return Err(BillingError::invalid_state(other.as_str(), "cancel")),
        }

        if let Some(gateway_id) = current.gateway_subscription_id.as_deref() {
            self.gateway
                .cancel_recurring_subscription(gateway_id)
                .await
                .map_err(|e| {
                    tracing::error!(subscription_id = %id, error = %e, "Gateway cancellation failed");
                    BillingError::PaymentGateway(e.to_string())
                })?;
        }

        let (_, transition) = modify_subscription(self.subscriptions.as_ref(), &lookup, |sub| {
            let transition = sub.cancel(Timestamp::now());
            if transition.is_applied() {
                Change::Save(transition)
            } else {
                Change::Keep(transition)
            }
        })
        .await?
        .ok_or(BillingError::SubscriptionNotFound(id))?;

        if let Transition::Rejected { from, .. } = transition {
            return Err(BillingError::invalid_state(from.as_str(), "cancel"));
        }

        let task = ProvisioningTask::CancelOrganization(id);
        if let Err(e) = self.dispatcher.dispatch(task).await {
            tracing::error!(%task, error = %e, "Could not schedule organization cancellation");
        }

        tracing::info!(subscription_id = %id, "Subscription cancelled");
        Ok(CancelSubscriptionResult {
            subscription_id: id,
            cancelled: transition.is_applied(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::domain::billing::test_support::pending_subscription;
    use crate::application::handlers::test_support::RecordingDispatcher;
    use crate::ports::PaymentError;

    struct Fixture {
        repo: InMemorySubscriptionRepository,
        gateway: MockPaymentGateway,
        dispatcher: Arc<RecordingDispatcher>,
        handler: CancelSubscriptionHandler,
    }

    fn fixture() -> Fixture {
        let repo = InMemorySubscriptionRepository::new();
        let gateway = MockPaymentGateway::new();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let handler = CancelSubscriptionHandler::new(
            Arc::new(repo.clone()),
            Arc::new(gateway.clone()),
            dispatcher.clone(),
        );
        Fixture {
            repo,
            gateway,
            dispatcher,
            handler,
        }
    }

    async fn active(repo: &InMemorySubscriptionRepository) -> SubscriptionId {
        let mut sub = pending_subscription("pat@grace.org");
        sub.activate(Timestamp::now());
        sub.gateway_subscription_id = Some("sub_1".into());
        let id = sub.id;
        repo.put(sub).await;
        id
    }

    #[tokio::test]
    async fn cancels_at_gateway_then_locally() {
        let f = fixture();
        let id = active(&f.repo).await;

        let result = f
            .handler
            .handle(CancelSubscriptionCommand { subscription_id: id })
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(f.gateway.call_count("cancel_recurring_subscription"), 1);
        let sub = f.repo.find(&SubscriptionLookup::Id(id)).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(sub.end_date.is_some());
        assert_eq!(
            f.dispatcher.tasks(),
            vec![ProvisioningTask::CancelOrganization(id)]
        );
    }

    #[tokio::test]
    async fn gateway_refusal_keeps_subscription_active() {
        let f = fixture();
        let id = active(&f.repo).await;
        f.gateway.fail_method(
            "cancel_recurring_subscription",
            PaymentError::network("timeout"),
        );

        let err = f
            .handler
            .handle(CancelSubscriptionCommand { subscription_id: id })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::PaymentGateway(_)));
        let sub = f.repo.find(&SubscriptionLookup::Id(id)).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn pending_purchase_cannot_be_cancelled_here() {
        let f = fixture();
        let sub = pending_subscription("pat@grace.org");
        let id = sub.id;
        f.repo.put(sub).await;

        let err = f
            .handler
            .handle(CancelSubscriptionCommand { subscription_id: id })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn repeated_cancel_is_a_no_op() {
        let f = fixture();
        let id = active(&f.repo).await;
        let cmd = CancelSubscriptionCommand { subscription_id: id };
        f.handler.handle(cmd.clone()).await.unwrap();

        let again = f.handler.handle(cmd).await.unwrap();

        assert!(!again.cancelled);
        assert_eq!(f.gateway.call_count("cancel_recurring_subscription"), 1);
        assert_eq!(f.dispatcher.tasks().len(), 1);
    }
}
