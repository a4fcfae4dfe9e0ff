//! In-process [`OrganizationBackend`] stand-ins.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::domain::foundation::SubscriptionId;
use crate::ports::{BackendError, CreateOrganizationRequest, CreatedOrganization, OrganizationBackend};

#[derive(Default)]
struct MockState {
    /// Consumed front to back; empty means succeed.
    create_results: VecDeque<Result<(), BackendError>>,
    created: Vec<CreateOrganizationRequest>,
    cancelled: Vec<String>,
    status_updates: Vec<(String, String)>,
    cancel_error: Option<BackendError>,
    healthy: bool,
    counter: u64,
    create_delay: Option<Duration>,
}

/// Records calls and replays scripted create outcomes.
#[derive(Clone)]
pub struct MockOrganizationBackend {
    inner: Arc<Mutex<MockState>>,
}

impl Default for MockOrganizationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOrganizationBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                healthy: true,
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues a failure for the next `create_organization` call.
    pub fn fail_next_create(&self, error: BackendError) {
        self.state().create_results.push_back(Err(error));
    }

    /// Holds every create call open for `delay` before answering.
    pub fn delay_creates(&self, delay: Duration) {
        self.state().create_delay = Some(delay);
    }

    pub fn fail_cancel(&self, error: BackendError) {
        self.state().cancel_error = Some(error);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state().healthy = healthy;
    }

    pub fn created(&self) -> Vec<CreateOrganizationRequest> {
        self.state().created.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state().counter as usize
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    pub fn status_updates(&self) -> Vec<(String, String)> {
        self.state().status_updates.clone()
    }
}

#[async_trait]
impl OrganizationBackend for MockOrganizationBackend {
    async fn create_organization(
        &self,
        request: &CreateOrganizationRequest,
    ) -> Result<CreatedOrganization, BackendError> {
        let delay = self.state().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.counter += 1;
        if let Some(Err(err)) = state.create_results.pop_front() {
            return Err(err);
        }
        state.created.push(request.clone());
        let organization_id = format!("org-{}", state.counter);
        let tenant_slug = request
            .name
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        Ok(CreatedOrganization {
            raw: json!({"organization_id": organization_id, "tenant_slug": tenant_slug}),
            organization_id,
            tenant_slug: Some(tenant_slug),
        })
    }

    async fn get_organization_status(&self, organization_id: &str) -> Result<Value, BackendError> {
        Ok(json!({"organization_id": organization_id, "status": "active"}))
    }

    async fn update_subscription_status(
        &self,
        organization_id: &str,
        status: &str,
        _subscription_data: Value,
    ) -> Result<Value, BackendError> {
        self.state()
            .status_updates
            .push((organization_id.to_string(), status.to_string()));
        Ok(json!({"status": status}))
    }

    async fn cancel_organization(
        &self,
        organization_id: &str,
        _subscription_id: &SubscriptionId,
    ) -> Result<Value, BackendError> {
        let mut state = self.state();
        if let Some(err) = state.cancel_error.clone() {
            return Err(err);
        }
        state.cancelled.push(organization_id.to_string());
        Ok(json!({"status": "cancelled"}))
    }

    async fn test_connection(&self) -> Result<Value, BackendError> {
        if self.state().healthy {
            Ok(json!({"status": "healthy"}))
        } else {
            Err(BackendError::Connection("connection refused".into()))
        }
    }
}

/// Used when no backend URL is configured. Every call fails with
/// [`BackendError::Disabled`], which leaves integrations in `failed` for a
/// later retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOrganizationBackend;

#[async_trait]
impl OrganizationBackend for DisabledOrganizationBackend {
    async fn create_organization(
        &self,
        _request: &CreateOrganizationRequest,
    ) -> Result<CreatedOrganization, BackendError> {
        Err(BackendError::Disabled)
    }

    async fn get_organization_status(&self, _id: &str) -> Result<Value, BackendError> {
        Err(BackendError::Disabled)
    }

    async fn update_subscription_status(
        &self,
        _id: &str,
        _status: &str,
        _data: Value,
    ) -> Result<Value, BackendError> {
        Err(BackendError::Disabled)
    }

    async fn cancel_organization(
        &self,
        _id: &str,
        _subscription_id: &SubscriptionId,
    ) -> Result<Value, BackendError> {
        Err(BackendError::Disabled)
    }

    async fn test_connection(&self) -> Result<Value, BackendError> {
        Err(BackendError::Disabled)
    }
}
