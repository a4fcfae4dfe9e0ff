//! BulkRetryHandler - operator-triggered retry of unfinished integrations.

use serde::Serialize;
use std::sync::Arc;

use super::coordinator::{ProvisioningCoordinator, ProvisioningOutcome};
use crate::domain::billing::{IntegrationStatus, Subscription, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::ports::{SubscriptionLookup, SubscriptionRepository};

/// Integration statuses a bulk retry picks up.
const RETRYABLE: [IntegrationStatus; 3] = [
    IntegrationStatus::Failed,
    IntegrationStatus::Pending,
    IntegrationStatus::NotStarted,
];

#[derive(Debug, Clone)]
pub struct BulkRetryCommand {
    /// Retry just this subscription instead of scanning.
    pub subscription_id: Option<SubscriptionId>,
    pub max_age_hours: u32,
    /// List candidates without calling the backend.
    pub dry_run: bool,
}

impl Default for BulkRetryCommand {
    fn default() -> Self {
        Self {
            subscription_id: None,
            max_age_hours: 24,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BulkRetryItemOutcome {
    Succeeded { organization_id: String },
    Failed { error: String },
    Skipped { reason: String },
    WouldRetry,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRetryItem {
    pub subscription_id: SubscriptionId,
    pub organization_name: String,
    pub integration_status: IntegrationStatus,
    #[serde(flatten)]
    pub outcome: BulkRetryItemOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkRetryResult {
    pub dry_run: bool,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<BulkRetryItem>,
}

impl BulkRetryResult {
    fn push(&mut self, sub: &Subscription, outcome: BulkRetryItemOutcome) {
        match outcome {
            BulkRetryItemOutcome::Succeeded { .. } => self.successful += 1,
            BulkRetryItemOutcome::Failed { .. } => self.failed += 1,
            BulkRetryItemOutcome::Skipped { .. } => self.skipped += 1,
            BulkRetryItemOutcome::WouldRetry => {}
        }
        self.items.push(BulkRetryItem {
            subscription_id: sub.id,
            organization_name: sub.organization_name.clone(),
            integration_status: sub.integration.status,
            outcome,
        });
    }
}

pub struct BulkRetryHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    coordinator: Arc<ProvisioningCoordinator>,
}

impl BulkRetryHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        coordinator: Arc<ProvisioningCoordinator>,
    ) -> Self {
        Self {
            subscriptions,
            coordinator,
        }
    }

    pub async fn handle(&self, cmd: BulkRetryCommand) -> Result<BulkRetryResult, DomainError> {
        let candidates = self.candidates(&cmd).await?;
        let mut result = BulkRetryResult {
            dry_run: cmd.dry_run,
            ..BulkRetryResult::default()
        };

        tracing::info!(
            candidates = candidates.len(),
            dry_run = cmd.dry_run,
            max_age_hours = cmd.max_age_hours,
            "Starting integration bulk retry"
        );

        if cmd.dry_run {
            for sub in &candidates {
                let outcome = match skip_reason(sub) {
                    Some(reason) => BulkRetryItemOutcome::Skipped { reason },
                    None => BulkRetryItemOutcome::WouldRetry,
                };
                result.push(sub, outcome);
            }
            return Ok(result);
        }

        if candidates.is_empty() {
            return Ok(result);
        }

        // One unreachable backend would fail every item; stop before touching any.
        self.coordinator.test_connection().await?;

        for sub in &candidates {
            if let Some(reason) = skip_reason(sub) {
                result.push(sub, BulkRetryItemOutcome::Skipped { reason });
                continue;
            }
            let outcome = match self.coordinator.retry_organization_creation(sub.id).await {
                Ok(ProvisioningOutcome::Created {
                    organization_id, ..
                }) => BulkRetryItemOutcome::Succeeded { organization_id },
                Ok(ProvisioningOutcome::AlreadyProvisioned { .. }) => BulkRetryItemOutcome::Skipped {
                    reason: "already provisioned".into(),
                },
                Ok(ProvisioningOutcome::NotEligible { reason }) => {
                    BulkRetryItemOutcome::Skipped { reason }
                }
                Err(e) => BulkRetryItemOutcome::Failed {
                    error: e.message().to_string(),
                },
            };
            result.push(sub, outcome);
        }

        tracing::info!(
            successful = result.successful,
            failed = result.failed,
            skipped = result.skipped,
            "Integration bulk retry finished"
        );
        Ok(result)
    }

    async fn candidates(&self, cmd: &BulkRetryCommand) -> Result<Vec<Subscription>, DomainError> {
        if let Some(id) = cmd.subscription_id {
            let sub = self
                .subscriptions
                .find(&SubscriptionLookup::Id(id))
                .await?
                .ok_or_else(|| {
                    DomainError::new(
                        ErrorCode::SubscriptionNotFound,
                        format!("Subscription {} not found", id),
                    )
                })?;
            return Ok(vec![sub]);
        }

        let cutoff = Timestamp::now().minus_hours(i64::from(cmd.max_age_hours));
        self.subscriptions
            .list_active_by_integration(&RETRYABLE, Some(cutoff))
            .await
    }
}

/// Only reachable for an explicitly named subscription; the scan already
/// filters these out.
fn skip_reason(sub: &Subscription) -> Option<String> {
    if sub.status != SubscriptionStatus::Active {
        return Some(format!("subscription is {}", sub.status));
    }
    if !RETRYABLE.contains(&sub.integration.status) {
        return Some(format!("integration is {}", sub.integration.status));
    }
    None
}
