//! PaymentMonitorHandler - periodic check for stuck payments and failures.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{SubscriptionRepository, WebhookEventRepository};

const LOOKBACK_HOURS: i64 = 24;
const STALE_PAYMENT_HOURS: i64 = 6;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PaymentHealthReport {
    pub failed_integrations: u64,
    pub stale_pending_payments: u64,
    pub webhook_failures: u64,
    pub alerts: Vec<String>,
}

impl PaymentHealthReport {
    pub fn is_healthy(&self) -> bool {
        self.alerts.is_empty()
    }
}

pub struct PaymentMonitorHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    webhook_events: Arc<dyn WebhookEventRepository>,
}

impl PaymentMonitorHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        webhook_events: Arc<dyn WebhookEventRepository>,
    ) -> Self {
        Self {
            subscriptions,
            webhook_events,
        }
    }

    pub async fn handle(&self) -> Result<PaymentHealthReport, DomainError> {
        let now = Timestamp::now();
        let since = now.minus_hours(LOOKBACK_HOURS);

        let mut report = PaymentHealthReport {
            failed_integrations: self
                .subscriptions
                .count_failed_integrations_since(since)
                .await?,
            stale_pending_payments: self
                .subscriptions
                .count_awaiting_payment_before(now.minus_hours(STALE_PAYMENT_HOURS))
                .await?,
            webhook_failures: self.webhook_events.count_failures_since(since).await?,
            alerts: Vec::new(),
        };

        if report.failed_integrations > 0 {
            report.alerts.push(format!(
                "{} failed backend integrations in the last 24 hours",
                report.failed_integrations
            ));
        }
        if report.stale_pending_payments > 0 {
            report.alerts.push(format!(
                "{} payments have been pending for over 6 hours",
                report.stale_pending_payments
            ));
        }
        if report.webhook_failures > 0 {
            report.alerts.push(format!(
                "{} webhook processing failures in the last 24 hours",
                report.webhook_failures
            ));
        }

        if report.is_healthy() {
            tracing::info!("Payment health check passed");
        } else {
            for alert in &report.alerts {
                tracing::error!(alert = %alert, "Payment health alert");
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryWebhookEventRepository};
    use crate::domain::billing::test_support::pending_subscription;
    use crate::domain::billing::WebhookEventRecord;

    #[tokio::test]
    async fn quiet_system_is_healthy() {
        let handler = PaymentMonitorHandler::new(
            Arc::new(InMemorySubscriptionRepository::new()),
            Arc::new(InMemoryWebhookEventRepository::new()),
        );
        assert!(handler.handle().await.unwrap().is_healthy());
    }

    #[tokio::test]
    async fn reports_each_problem_kind() {
        let subs = InMemorySubscriptionRepository::new();
        let events = InMemoryWebhookEventRepository::new();

        let mut stale = pending_subscription("old@grace.org");
        stale.created_at = Timestamp::now().minus_hours(7);
        subs.put(stale).await;

        let mut failed = pending_subscription("failed@grace.org");
        failed.activate(Timestamp::now());
        failed.record_provisioning_failure("Request timeout", Timestamp::now());
        subs.put(failed).await;

        let mut event = WebhookEventRecord::received(
            "evt_1",
            "checkout.session.completed",
            serde_json::json!({}),
            Timestamp::now(),
        );
        event.processing_error = Some("Database error: gone".into());
        events.put(event).await;

        let report = PaymentMonitorHandler::new(Arc::new(subs), Arc::new(events))
            .handle()
            .await
            .unwrap();

        assert_eq!(report.stale_pending_payments, 1);
        assert_eq!(report.failed_integrations, 1);
        assert_eq!(report.webhook_failures, 1);
        assert_eq!(
            report.alerts,
            vec![
                "1 failed backend integrations in the last 24 hours".to_string(),
                "1 payments have been pending for over 6 hours".to_string(),
                "1 webhook processing failures in the last 24 hours".to_string(),
            ]
        );
    }
}
