//! Provisioning handlers.
//!
//! ## Commands
//! - Creating, retrying and cancelling backend organizations
//! - Bulk retry of unfinished integrations
//!
//! ## Queries
//! - Integration failure-rate health check
//! - Payment health monitor

mod bulk_retry;
mod coordinator;
mod integration_health;
mod payment_monitor;

pub use bulk_retry::{
    BulkRetryCommand, BulkRetryHandler, BulkRetryItem, BulkRetryItemOutcome, BulkRetryResult,
};
pub use coordinator::{CancellationOutcome, ProvisioningCoordinator, ProvisioningOutcome};
pub use integration_health::{
    IntegrationHealthHandler, IntegrationHealthReport, FAILURE_RATE_THRESHOLD,
};
pub use payment_monitor::{PaymentHealthReport, PaymentMonitorHandler};
