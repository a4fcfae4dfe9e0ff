//! Hand-off point for background provisioning work.
//!
//! Two implementations are selected by configuration: a queued one with its
//! own workers and an inline one that runs the task in the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::{DomainError, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", content = "subscription_id", rename_all = "snake_case")]
pub enum ProvisioningTask {
    CreateOrganization(SubscriptionId),
    CancelOrganization(SubscriptionId),
    /// Push the current subscription status to an existing organization.
    SyncStatus(SubscriptionId),
}

impl ProvisioningTask {
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            ProvisioningTask::CreateOrganization(id)
            | ProvisioningTask::CancelOrganization(id)
            | ProvisioningTask::SyncStatus(id) => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProvisioningTask::CreateOrganization(_) => "create_organization",
            ProvisioningTask::CancelOrganization(_) => "cancel_organization",
            ProvisioningTask::SyncStatus(_) => "sync_status",
        }
    }
}

impl fmt::Display for ProvisioningTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.subscription_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("task queue is full")]
    QueueFull,
    #[error("task queue is closed")]
    Closed,
}

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Schedules `task`. Failures of the task itself never surface here.
    async fn dispatch(&self, task: ProvisioningTask) -> Result<(), DispatchError>;
}

/// Executes one provisioning task. Implemented by the provisioning
/// coordinator; dispatchers decide when and how often to call it.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: ProvisioningTask) -> Result<(), DomainError>;
}
