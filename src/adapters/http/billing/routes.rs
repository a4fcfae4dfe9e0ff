//! Axum router configuration for billing endpoints.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_checkout, cancel_subscription, checkout_status, create_checkout, list_tiers,
    retry_integration, stripe_webhook, subscription_status, validate_coupon, BillingAppState,
};
use crate::adapters::http::middleware::{require_status_token, StatusToken};

/// Public routes used by the marketing site.
///
/// - `GET /tiers`
/// - `POST /coupons/validate`
/// - `POST /checkout`
/// - `POST /checkout/:id/cancel`
/// - `GET /checkout/:id/status`
pub fn checkout_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/tiers", get(list_tiers))
        .route("/coupons/validate", post(validate_coupon))
        .route("/checkout", post(create_checkout))
        .route("/checkout/:id/cancel", post(cancel_checkout))
        .route("/checkout/:id/status", get(checkout_status))
}

/// Stripe webhook intake. No auth; the signature is the credential.
/// Any method other than POST gets 405.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(stripe_webhook))
}

/// Routes the church directory backend calls, behind the bearer token.
pub fn backend_routes(token: StatusToken) -> Router<BillingAppState> {
    Router::new()
        .route("/status", get(subscription_status))
        .route("/:id/cancel", post(cancel_subscription))
        .route("/:id/retry-integration", post(retry_integration))
        .route_layer(middleware::from_fn_with_state(token, require_status_token))
}

/// All billing routes, for mounting at `/api`.
pub fn billing_router(state: BillingAppState) -> Router {
    let token: StatusToken = Arc::new(state.services.settings.status_api_token.clone());
    Router::new()
        .merge(checkout_routes())
        .nest("/webhooks", webhook_routes())
        .nest("/subscriptions", backend_routes(token))
        .with_state(state)
}
