//! ProvisioningCoordinator - creates, updates and tears down the customer's
//! organization on the backend, tracking the result on the subscription.
//!
//! Every operation is safe to repeat: a completed integration is never
//! created twice and a missing organization is never cancelled. A create
//! request only goes out after the caller wins the in-flight claim through
//! a version-checked update, so concurrent attempts cannot both call out.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::application::handlers::versioned_update::{modify_subscription, Change};
use crate::domain::billing::{IntegrationStatus, Subscription, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::ports::{
    CreateOrganizationRequest, OrganizationBackend, ProvisioningTask, SubscriptionLookup,
    SubscriptionRepository, TaskRunner,
};

/// Result of a create request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    Created {
        organization_id: String,
        tenant_slug: Option<String>,
    },
    /// Integration was already completed; the backend was not called.
    AlreadyProvisioned { organization_id: String },
    /// Subscription is not active, or its integration was cancelled.
    NotEligible { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOutcome {
    Cancelled,
    /// Nothing was provisioned, so there is nothing to tear down.
    NoOrganization,
}

pub struct ProvisioningCoordinator {
    subscriptions: Arc<dyn SubscriptionRepository>,
    backend: Arc<dyn OrganizationBackend>,
}

impl ProvisioningCoordinator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        backend: Arc<dyn OrganizationBackend>,
    ) -> Self {
        Self {
            subscriptions,
            backend,
        }
    }

    async fn load(&self, id: SubscriptionId) -> Result<Subscription, DomainError> {
        self.subscriptions
            .find(&SubscriptionLookup::Id(id))
            .await?
            .ok_or_else(|| subscription_not_found(id))
    }

    /// Creates the organization for an active subscription.
    ///
    /// A backend failure is recorded on the subscription (`failed`, with the
    /// error text) and then returned as `ExternalServiceError`.
    pub async fn create_organization(
        &self,
        id: SubscriptionId,
    ) -> Result<ProvisioningOutcome, DomainError> {
        let lookup = SubscriptionLookup::Id(id);
        let prepared = modify_subscription(self.subscriptions.as_ref(), &lookup, |sub| {
            if let Some(org) = completed_organization(sub) {
                return Change::Keep(Err(ProvisioningOutcome::AlreadyProvisioned {
                    organization_id: org,
                }));
            }
            if sub.status != SubscriptionStatus::Active {
                return Change::Keep(Err(ProvisioningOutcome::NotEligible {
                    reason: format!("subscription is {}", sub.status),
                }));
            }
            match sub.integration.status {
                IntegrationStatus::Pending
                | IntegrationStatus::NotStarted
                | IntegrationStatus::Failed => {
                    let now = Timestamp::now();
                    sub.begin_provisioning(now);
                    if sub.claim_provisioning(now) {
                        Change::Save(Ok(()))
                    } else {
                        Change::Keep(Err(ProvisioningOutcome::NotEligible {
                            reason: "provisioning already in progress".to_string(),
                        }))
                    }
                }
                other => Change::Keep(Err(ProvisioningOutcome::NotEligible {
                    reason: format!("integration is {}", other),
                })),
            }
        })
        .await?
        .ok_or_else(|| subscription_not_found(id))?;

        let subscription = match prepared {
            (_, Err(outcome)) => {
                tracing::info!(subscription_id = %id, ?outcome, "Organization creation skipped");
                return Ok(outcome);
            }
            (subscription, Ok(())) => subscription,
        };

        let request = CreateOrganizationRequest::from_subscription(&subscription);
        tracing::info!(
            subscription_id = %id,
            organization = %request.name,
            attempt = subscription.integration.attempts + 1,
            "Creating backend organization"
        );

        match self.backend.create_organization(&request).await {
            Ok(created) => {
                let organization_id = created.organization_id.clone();
                let tenant_slug = created.tenant_slug.clone();
                modify_subscription(self.subscriptions.as_ref(), &lookup, |sub| {
                    sub.record_provisioning_success(
                        created.organization_id.clone(),
                        created.tenant_slug.clone(),
                        created.raw.clone(),
                        Timestamp::now(),
                    );
                    Change::Save(())
                })
                .await?;
                tracing::info!(
                    subscription_id = %id,
                    organization_id = %organization_id,
                    "Backend organization created"
                );
                Ok(ProvisioningOutcome::Created {
                    organization_id,
                    tenant_slug,
                })
            }
            Err(err) => {
                let message = err.to_string();
                modify_subscription(self.subscriptions.as_ref(), &lookup, |sub| {
                    sub.record_provisioning_failure(message.clone(), Timestamp::now());
                    Change::Save(())
                })
                .await?;
                tracing::error!(
                    subscription_id = %id,
                    error = %message,
                    transient = err.is_transient(),
                    "Backend organization creation failed"
                );
                Err(DomainError::new(
                    ErrorCode::ExternalServiceError,
                    format!("Organization creation failed: {}", message),
                )
                .with_detail("subscription_id", id.to_string()))
            }
        }
    }

    /// Operator retry: forces the integration back to `pending` and creates.
    pub async fn retry_organization_creation(
        &self,
        id: SubscriptionId,
    ) -> Result<ProvisioningOutcome, DomainError> {
        modify_subscription(
            self.subscriptions.as_ref(),
            &SubscriptionLookup::Id(id),
            |sub| {
                if sub.integration.status == IntegrationStatus::Pending {
                    return Change::Keep(());
                }
                if sub.reset_provisioning_for_retry(Timestamp::now()) {
                    Change::Save(())
                } else {
                    Change::Keep(())
                }
            },
        )
        .await?
        .ok_or_else(|| subscription_not_found(id))?;

        self.create_organization(id).await
    }

    /// Tears down the organization of a cancelled subscription.
    pub async fn handle_subscription_cancellation(
        &self,
        id: SubscriptionId,
    ) -> Result<CancellationOutcome, DomainError> {
        let subscription = self.load(id).await?;
        let Some(organization_id) = completed_organization(&subscription) else {
            tracing::info!(
                subscription_id = %id,
                integration = %subscription.integration.status,
                "No backend organization to cancel"
            );
            return Ok(CancellationOutcome::NoOrganization);
        };

        self.backend
            .cancel_organization(&organization_id, &id)
            .await
            .map_err(|e| {
                tracing::error!(
                    subscription_id = %id,
                    organization_id = %organization_id,
                    error = %e,
                    "Backend organization cancellation failed"
                );
                DomainError::new(
                    ErrorCode::ExternalServiceError,
                    format!("Organization cancellation failed: {}", e),
                )
            })?;

        modify_subscription(
            self.subscriptions.as_ref(),
            &SubscriptionLookup::Id(id),
            |sub| {
                if sub.record_organization_cancelled(Timestamp::now()) {
                    Change::Save(())
                } else {
                    Change::Keep(())
                }
            },
        )
        .await?;

        tracing::info!(
            subscription_id = %id,
            organization_id = %organization_id,
            "Backend organization cancelled"
        );
        Ok(CancellationOutcome::Cancelled)
    }

    /// Pushes the current subscription status to the organization. Returns
    /// false when there is no provisioned organization.
    pub async fn sync_status(&self, id: SubscriptionId) -> Result<bool, DomainError> {
        let subscription = self.load(id).await?;
        let Some(organization_id) = completed_organization(&subscription) else {
            return Ok(false);
        };

        let data = json!({
            "tier": subscription.tier_name,
            "billing_period": subscription.billing_period.as_str(),
            "amount": subscription.final_amount.as_dollars_f64(),
            "next_billing_date": subscription.next_billing_date.map(|t| t.as_datetime().to_rfc3339()),
            "end_date": subscription.end_date.map(|t| t.as_datetime().to_rfc3339()),
        });

        self.backend
            .update_subscription_status(&organization_id, subscription.status.as_str(), data)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::ExternalServiceError,
                    format!("Status sync failed: {}", e),
                )
            })?;

        tracing::info!(
            subscription_id = %id,
            organization_id = %organization_id,
            status = %subscription.status,
            "Subscription status pushed to backend"
        );
        Ok(true)
    }

    pub async fn test_connection(&self) -> Result<serde_json::Value, DomainError> {
        self.backend.test_connection().await.map_err(|e| {
            DomainError::new(
                ErrorCode::ExternalServiceError,
                format!("Backend API connection failed: {}", e),
            )
        })
    }
}

#[async_trait]
impl TaskRunner for ProvisioningCoordinator {
    async fn run(&self, task: ProvisioningTask) -> Result<(), DomainError> {
        match task {
            ProvisioningTask::CreateOrganization(id) => self.create_organization(id).await.map(|_| ()),
            ProvisioningTask::CancelOrganization(id) => {
                self.handle_subscription_cancellation(id).await.map(|_| ())
            }
            ProvisioningTask::SyncStatus(id) => self.sync_status(id).await.map(|_| ()),
        }
    }
}

fn completed_organization(sub: &Subscription) -> Option<String> {
    if sub.is_provisioned() {
        sub.integration.organization_id.clone()
    } else {
        None
    }
}

fn subscription_not_found(id: SubscriptionId) -> DomainError {
    DomainError::new(
        ErrorCode::SubscriptionNotFound,
        format!("Subscription {} not found", id),
    )
}
