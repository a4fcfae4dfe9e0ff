//! Bounded queue drained by a fixed pool of worker tasks.
//!
//! `CreateOrganization` is retried with exponential backoff; the other task
//! kinds run once. Workers stop on shutdown after finishing the attempt in
//! progress; a task waiting out a backoff delay is abandoned and left for
//! the bulk retry.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_retry::RetryIf;

use super::retry::RetryPolicy;
use crate::domain::foundation::DomainError;
use crate::ports::{DispatchError, ProvisioningTask, TaskDispatcher, TaskRunner};

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub workers: usize,
    pub capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct QueuedTaskDispatcher {
    sender: mpsc::Sender<ProvisioningTask>,
}

/// Join handles for the workers started with a [`QueuedTaskDispatcher`].
/// Dropping this without calling `shutdown` also stops the workers.
pub struct TaskWorkers {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl QueuedTaskDispatcher {
    /// Spawns `settings.workers` workers on the current runtime.
    pub fn start(runner: Arc<dyn TaskRunner>, settings: QueueSettings) -> (Self, TaskWorkers) {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = (0..settings.workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&runner),
                    settings.retry,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        tracing::info!(
            workers = settings.workers.max(1),
            capacity = settings.capacity,
            "Provisioning task workers started"
        );

        (
            Self { sender },
            TaskWorkers {
                handles,
                shutdown: shutdown_tx,
            },
        )
    }
}

impl TaskWorkers {
    /// Signals every worker to stop and waits for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Task worker panicked");
            }
        }
        tracing::info!("Provisioning task workers stopped");
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<ProvisioningTask>>>,
    runner: Arc<dyn TaskRunner>,
    retry: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                _ = shutdown.changed() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = next else {
            break;
        };

        tokio::select! {
            _ = shutdown.changed() => {
                tracing::warn!(worker, %task, "Shutdown during task; left for bulk retry");
                break;
            }
            result = run_with_policy(runner.as_ref(), task, retry) => {
                if let Err(e) = result {
                    tracing::error!(worker, %task, error = %e, "Provisioning task failed permanently");
                }
            }
        }
    }
}

/// Runs `task` through `runner`. Only organization creation is retried, and
/// only for transient failures.
pub(crate) async fn run_with_policy(
    runner: &dyn TaskRunner,
    task: ProvisioningTask,
    retry: RetryPolicy,
) -> Result<(), DomainError> {
    match task {
        ProvisioningTask::CreateOrganization(_) => {
            RetryIf::start(
                retry.delays(),
                move || async move {
                    let result = runner.run(task).await;
                    if let Err(e) = &result {
                        tracing::warn!(%task, error = %e, "Provisioning attempt failed");
                    }
                    result
                },
                |e: &DomainError| e.is_retryable(),
            )
            .await
        }
        ProvisioningTask::CancelOrganization(_) | ProvisioningTask::SyncStatus(_) => {
            runner.run(task).await
        }
    }
}

#[async_trait]
impl TaskDispatcher for QueuedTaskDispatcher {
    async fn dispatch(&self, task: ProvisioningTask) -> Result<(), DispatchError> {
        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;
        tracing::debug!(%task, "Provisioning task queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ErrorCode, SubscriptionId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FlakyRunner {
        calls: AtomicUsize,
        fail_first: usize,
        done: tokio::sync::Notify,
    }

    #[async_trait]
    impl TaskRunner for FlakyRunner {
        async fn run(&self, _task: ProvisioningTask) -> Result<(), DomainError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(DomainError::new(ErrorCode::ExternalServiceError, "HTTP 500"));
            }
            self.done.notify_one();
            Ok(())
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn create_is_retried_until_success() {
        let runner = Arc::new(FlakyRunner {
            calls: AtomicUsize::new(0),
            fail_first: 2,
            done: tokio::sync::Notify::new(),
        });
        let (dispatcher, workers) = QueuedTaskDispatcher::start(
            runner.clone(),
            QueueSettings {
                workers: 1,
                capacity: 4,
                retry: fast_retry(5),
            },
        );

        dispatcher
            .dispatch(ProvisioningTask::CreateOrganization(SubscriptionId::new()))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), runner.done.notified())
            .await
            .unwrap();

        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        workers.shutdown().await;
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let runner = FlakyRunner {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
            done: tokio::sync::Notify::new(),
        };
        let result = run_with_policy(
            &runner,
            ProvisioningTask::CreateOrganization(SubscriptionId::new()),
            fast_retry(3),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancel_runs_once() {
        let runner = FlakyRunner {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
            done: tokio::sync::Notify::new(),
        };
        let _ = run_with_policy(
            &runner,
            ProvisioningTask::CancelOrganization(SubscriptionId::new()),
            fast_retry(5),
        )
        .await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        struct Blocked;
        #[async_trait]
        impl TaskRunner for Blocked {
            async fn run(&self, _task: ProvisioningTask) -> Result<(), DomainError> {
                std::future::pending::<()>().await;
                Ok(())
            }
        }

        let (dispatcher, _workers) = QueuedTaskDispatcher::start(
            Arc::new(Blocked),
            QueueSettings {
                workers: 1,
                capacity: 1,
                retry: RetryPolicy::once(),
            },
        );

        let mut saw_full = false;
        for _ in 0..4 {
            if dispatcher
                .dispatch(ProvisioningTask::SyncStatus(SubscriptionId::new()))
                .await
                == Err(DispatchError::QueueFull)
            {
                saw_full = true;
            }
        }
        assert!(saw_full);
    }
}
