//! Stripe payment gateway adapter.
//!
//! - `StripePaymentAdapter` talks to the Stripe REST API
//! - `MockPaymentGateway` is an in-process stand-in for tests and dry runs
//!
//! Webhook signature checks are not here; see `domain::billing::StripeWebhookVerifier`.

mod mock_gateway;
mod stripe_adapter;
mod types;

pub use mock_gateway::{MethodCall, MockPaymentGateway};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
