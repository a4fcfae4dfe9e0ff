//! Stripe webhook intake.
//!
//! `ProcessWebhookHandler` owns verification and exactly-once claiming;
//! `EventReconciler` maps each event type onto the subscription state machine.

mod process_webhook;
mod purge_events;
mod reconciler;

pub use process_webhook::{ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult};
pub use purge_events::{PurgeWebhookEventsCommand, PurgeWebhookEventsHandler};
pub use reconciler::{EventReconciler, Reconciled};
