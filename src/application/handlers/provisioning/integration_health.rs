//! IntegrationHealthHandler - failure-rate check across active subscriptions.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::ports::{IntegrationCounts, SubscriptionRepository};

/// Alert when more than this share of integrations failed.
pub const FAILURE_RATE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationHealthReport {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
    pub not_started: u64,
    pub failure_rate: f64,
    pub alerts: Vec<String>,
}

impl IntegrationHealthReport {
    fn from_counts(counts: IntegrationCounts) -> Self {
        let failure_rate = counts.failure_rate();
        let mut alerts = Vec::new();
        if failure_rate > FAILURE_RATE_THRESHOLD {
            alerts.push(format!(
                "High integration failure rate: {:.1}% ({} of {})",
                failure_rate * 100.0,
                counts.failed,
                counts.total
            ));
        }
        Self {
            total: counts.total,
            completed: counts.completed,
            failed: counts.failed,
            pending: counts.pending,
            not_started: counts.not_started,
            failure_rate,
            alerts,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.alerts.is_empty()
    }
}

pub struct IntegrationHealthHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl IntegrationHealthHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(&self) -> Result<IntegrationHealthReport, DomainError> {
        let counts = self.subscriptions.integration_counts().await?;
        let report = IntegrationHealthReport::from_counts(counts);
        for alert in &report.alerts {
            tracing::error!(alert = %alert, "Integration health alert");
        }
        Ok(report)
    }
}
