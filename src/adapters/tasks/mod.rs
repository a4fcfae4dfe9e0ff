//! Provisioning task dispatch.
//!
//! - `QueuedTaskDispatcher` hands tasks to background workers with retry
//! - `InlineTaskDispatcher` runs them immediately in the caller

mod inline;
mod queued;
mod retry;

pub use inline::InlineTaskDispatcher;
pub use queued::{QueueSettings, QueuedTaskDispatcher, TaskWorkers};
pub use retry::RetryPolicy;
