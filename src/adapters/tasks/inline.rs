use async_trait::async_trait;
use std::sync::Arc;

use crate::ports::{DispatchError, ProvisioningTask, TaskDispatcher, TaskRunner};

/// Runs each task in the caller, once. Task failures are logged, never
/// returned, so a webhook response is not affected by the backend.
#[derive(Clone)]
pub struct InlineTaskDispatcher {
    runner: Arc<dyn TaskRunner>,
}

impl InlineTaskDispatcher {
    pub fn new(runner: Arc<dyn TaskRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskDispatcher for InlineTaskDispatcher {
    async fn dispatch(&self, task: ProvisioningTask) -> Result<(), DispatchError> {
        if let Err(e) = self.runner.run(task).await {
            tracing::error!(%task, error = %e, "Inline provisioning task failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFails(AtomicUsize);

    #[async_trait]
    impl TaskRunner for AlwaysFails {
        async fn run(&self, _task: ProvisioningTask) -> Result<(), DomainError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::new(ErrorCode::ExternalServiceError, "Request timeout"))
        }
    }

    #[tokio::test]
    async fn failure_is_swallowed_after_one_attempt() {
        let runner = Arc::new(AlwaysFails(AtomicUsize::new(0)));
        let dispatcher = InlineTaskDispatcher::new(runner.clone());

        let result = dispatcher
            .dispatch(ProvisioningTask::CreateOrganization(SubscriptionId::new()))
            .await;

        assert!(result.is_ok());
        assert_eq!(runner.0.load(Ordering::SeqCst), 1);
    }
}
