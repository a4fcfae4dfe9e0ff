//! Shared fixtures for handler tests.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::ports::{DispatchError, ProvisioningTask, TaskDispatcher};

/// Records dispatched tasks instead of running them.
#[derive(Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<ProvisioningTask>>,
}

impl RecordingDispatcher {
    pub fn tasks(&self) -> Vec<ProvisioningTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, task: ProvisioningTask) -> Result<(), DispatchError> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}
