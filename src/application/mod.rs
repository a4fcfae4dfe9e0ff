//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;

pub use handlers::billing::{
    CancelPendingCheckoutCommand, CancelPendingCheckoutHandler, CancelSubscriptionCommand,
    CancelSubscriptionHandler, CreateCheckoutCommand, CreateCheckoutHandler, EventReconciler,
    GetCheckoutStatusHandler, GetSubscriptionStatusHandler, ListTiersHandler,
    ProcessWebhookCommand, ProcessWebhookHandler, ValidateCouponHandler,
};
pub use handlers::provisioning::{
    BulkRetryCommand, BulkRetryHandler, IntegrationHealthHandler, PaymentMonitorHandler,
    ProvisioningCoordinator,
};
