//! Billing handlers.
//!
//! ## Commands
//! - `CreateCheckoutHandler` - price, guard and open a hosted checkout
//! - `CancelPendingCheckoutHandler` - customer backed out before paying
//! - `CancelSubscriptionHandler` - end a paid subscription
//! - `ProcessWebhookHandler` - reconcile Stripe events
//! - `PurgeWebhookEventsHandler` - trim the event log
//!
//! ## Queries
//! - `ListTiersHandler`, `ValidateCouponHandler` - catalog
//! - `GetCheckoutStatusHandler` - success page polling
//! - `GetSubscriptionStatusHandler` - backend status lookups

mod cancel_pending_checkout;
mod cancel_subscription;
mod coupon_release;
mod create_checkout;
mod get_checkout_status;
mod get_subscription_status;
mod list_tiers;
mod validate_coupon;
mod webhook;

pub use cancel_pending_checkout::{
    CancelPendingCheckoutCommand, CancelPendingCheckoutHandler, CancelPendingCheckoutResult,
};
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_checkout::{
    CheckoutSettings, CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult,
    SUBSCRIPTION_ID_PLACEHOLDER,
};
pub use get_checkout_status::{CheckoutStatusView, GetCheckoutStatusHandler, GetCheckoutStatusQuery};
pub use get_subscription_status::{
    GetSubscriptionStatusHandler, SubscriptionStatusQuery, SubscriptionStatusView,
};
pub use list_tiers::ListTiersHandler;
pub use validate_coupon::{ValidateCouponHandler, ValidateCouponQuery, ValidateCouponResult};
pub use webhook::{
    EventReconciler, ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
    PurgeWebhookEventsCommand, PurgeWebhookEventsHandler, Reconciled,
};
