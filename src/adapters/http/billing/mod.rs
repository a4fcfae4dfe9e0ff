//! HTTP adapter for billing endpoints.
//!
//! Public (marketing site):
//! - `GET /api/tiers` - Active pricing tiers
//! - `POST /api/coupons/validate` - Coupon price preview
//! - `POST /api/checkout` - Start a hosted checkout
//! - `POST /api/checkout/:id/cancel` - Abandon a pending checkout
//! - `GET /api/checkout/:id/status` - Success page polling
//!
//! Stripe:
//! - `POST /api/webhooks/stripe` - Signed event intake
//!
//! Church directory backend (bearer token):
//! - `GET /api/subscriptions/status` - Lookup by organization, tenant or email
//! - `POST /api/subscriptions/:id/cancel` - End a paid subscription
//! - `POST /api/subscriptions/:id/retry-integration` - Retry provisioning

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::BillingAppState;
pub use routes::billing_router;
