//! Billing domain: pricing, coupons, the subscription aggregate and the
//! Stripe webhook vocabulary.

mod aggregate;
mod checkout_session;
mod coupon;
mod errors;
mod pricing;
mod status;
mod stripe_event;
mod webhook_errors;
mod webhook_event;
mod webhook_verifier;

pub use aggregate::{
    normalize_email, ContactDetails, Integration, Subscription, Transition, PROVISIONING_CLAIM_SECS,
};
pub use checkout_session::{CheckoutSessionRecord, CheckoutSessionStatus};
pub use coupon::{Coupon, CouponCode, CouponInvalidReason, Discount};
pub use errors::BillingError;
pub use pricing::{
    quote, resolve_base_amount, AppliedCoupon, BillingPeriod, CouponRejection, PriceQuote,
    PricingTier, ResolvedPrice,
};
pub use status::{IntegrationStatus, SubscriptionStatus};
pub use stripe_event::{
    CheckoutSessionObject, InvoiceObject, PaymentIntentObject, StripeEvent, StripeEventData,
    StripeEventType, SubscriptionObject, SUBSCRIPTION_ID_METADATA_KEY,
};
pub use webhook_errors::WebhookError;
pub use webhook_event::{ReconcileOutcome, WebhookEventRecord};
pub use webhook_verifier::{SignatureHeader, StripeWebhookVerifier};

#[cfg(test)]
pub(crate) mod test_support {
    pub use super::aggregate::test_support::*;
    pub use super::coupon::test_support::*;
    pub use super::pricing::test_support::*;
    pub use super::stripe_event::StripeEventBuilder;
    pub use super::webhook_verifier::compute_test_signature;
}
