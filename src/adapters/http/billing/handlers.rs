//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::adapters::http::error::ApiError;
use crate::app::Services;
use crate::application::handlers::billing::{
    CancelPendingCheckoutCommand, CancelPendingCheckoutHandler, CancelSubscriptionCommand,
    CancelSubscriptionHandler, CreateCheckoutCommand, CreateCheckoutHandler,
    GetCheckoutStatusHandler, GetCheckoutStatusQuery, GetSubscriptionStatusHandler,
    ListTiersHandler, ProcessWebhookCommand, ProcessWebhookHandler, SubscriptionStatusQuery,
    ValidateCouponHandler, ValidateCouponQuery,
};
use crate::domain::billing::{BillingPeriod, ContactDetails, WebhookError};
use crate::domain::foundation::{SubscriptionId, TierId};

use super::dto::{
    CancelCheckoutResponse, CancelSubscriptionResponse, CheckoutResponse, CreateCheckoutRequest,
    RetryIntegrationResponse, SubscriptionStatusParams, TierResponse, ValidateCouponRequest,
    ValidateCouponResponse, WebhookResponse,
};

const STRIPE_SIGNATURE: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes. Handlers are built per request from
/// the wired services.
#[derive(Clone)]
pub struct BillingAppState {
    pub services: Services,
}

impl BillingAppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn list_tiers_handler(&self) -> ListTiersHandler {
        ListTiersHandler::new(self.services.repositories.tiers.clone())
    }

    fn validate_coupon_handler(&self) -> ValidateCouponHandler {
        let repos = &self.services.repositories;
        ValidateCouponHandler::new(repos.tiers.clone(), repos.coupons.clone())
    }

    fn create_checkout_handler(&self) -> CreateCheckoutHandler {
        let repos = &self.services.repositories;
        CreateCheckoutHandler::new(
            repos.tiers.clone(),
            repos.coupons.clone(),
            repos.subscriptions.clone(),
            repos.sessions.clone(),
            self.services.gateway.clone(),
            self.services.settings.checkout.clone(),
        )
    }

    fn cancel_checkout_handler(&self) -> CancelPendingCheckoutHandler {
        let repos = &self.services.repositories;
        CancelPendingCheckoutHandler::new(
            repos.subscriptions.clone(),
            repos.sessions.clone(),
            repos.coupons.clone(),
            self.services.gateway.clone(),
        )
    }

    fn checkout_status_handler(&self) -> GetCheckoutStatusHandler {
        GetCheckoutStatusHandler::new(
            self.services.repositories.subscriptions.clone(),
            self.services.gateway.clone(),
        )
    }

    fn webhook_handler(&self) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(
            self.services.settings.verifier(),
            self.services.repositories.webhook_events.clone(),
            self.services.reconciler(),
        )
    }

    fn subscription_status_handler(&self) -> GetSubscriptionStatusHandler {
        GetSubscriptionStatusHandler::new(self.services.repositories.subscriptions.clone())
    }

    fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.services.repositories.subscriptions.clone(),
            self.services.gateway.clone(),
            self.services.dispatcher.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Catalog
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/tiers - Active pricing tiers in display order
pub async fn list_tiers(
    State(state): State<BillingAppState>,
) -> Result<impl IntoResponse, ApiError> {
    let tiers = state.list_tiers_handler().handle().await?;
    let response: Vec<TierResponse> = tiers.into_iter().map(TierResponse::from).collect();
    Ok(Json(response))
}

/// POST /api/coupons/validate - Price preview; never touches usage counters
pub async fn validate_coupon(
    State(state): State<BillingAppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Ok(tier_id) = request.tier_id.parse::<TierId>() else {
        return Ok(Json(ValidateCouponResponse {
            valid: false,
            message: "Invalid coupon code.".to_string(),
            discount_amount: Default::default(),
            final_price: Default::default(),
        }));
    };
    let query = ValidateCouponQuery {
        coupon_code: request.coupon_code,
        tier_id,
        billing_period: BillingPeriod::parse_or_monthly(request.billing_period.as_deref()),
    };
    let result = state.validate_coupon_handler().handle(query).await?;
    Ok(Json(ValidateCouponResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/checkout - Create a pending subscription and hosted checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = CreateCheckoutCommand {
        tier_id: request.tier_id,
        billing_period: BillingPeriod::parse_or_monthly(request.billing_period.as_deref()),
        coupon_code: request.coupon_code,
        contact: ContactDetails {
            email: request.email,
            organization_name: request.church_name,
            contact_name: request.contact_name,
            phone: request.phone,
        },
    };
    let result = state.create_checkout_handler().handle(cmd).await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /api/checkout/{id}/cancel - Customer returned from checkout without paying
pub async fn cancel_checkout(
    State(state): State<BillingAppState>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .cancel_checkout_handler()
        .handle(CancelPendingCheckoutCommand { subscription_id })
        .await?;
    Ok(Json(CancelCheckoutResponse::new(subscription_id, result)))
}

/// GET /api/checkout/{id}/status - Success page polling
pub async fn checkout_status(
    State(state): State<BillingAppState>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .checkout_status_handler()
        .handle(GetCheckoutStatusQuery { subscription_id })
        .await?;
    Ok(Json(view))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/stripe - Verified, idempotent event intake
pub async fn stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    let cmd = ProcessWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };
    let result = state.webhook_handler().handle(cmd).await?;
    Ok(Json(WebhookResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Backend-facing (bearer token)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/subscriptions/status - Lookup by exactly one selector
pub async fn subscription_status(
    State(state): State<BillingAppState>,
    Query(params): Query<SubscriptionStatusParams>,
) -> Result<impl IntoResponse, ApiError> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let selectors = [
        non_empty(params.organization_id).map(SubscriptionStatusQuery::OrganizationId),
        non_empty(params.tenant_slug).map(SubscriptionStatusQuery::TenantSlug),
        non_empty(params.email).map(SubscriptionStatusQuery::Email),
    ];
    let mut provided = selectors.into_iter().flatten();
    let query = match (provided.next(), provided.next()) {
        (Some(query), None) => query,
        _ => {
            return Err(ApiError::BadRequest(
                "Provide exactly one of organization_id, tenant_slug or email".to_string(),
            ))
        }
    };

    let view = state
        .subscription_status_handler()
        .handle(query)
        .await?
        .ok_or_else(|| ApiError::NotFound("Subscription not found".to_string()))?;
    Ok(Json(view))
}

/// POST /api/subscriptions/{id}/cancel - End a paid subscription
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .cancel_subscription_handler()
        .handle(CancelSubscriptionCommand { subscription_id })
        .await?;
    Ok(Json(CancelSubscriptionResponse {
        subscription_id: result.subscription_id,
        cancelled: result.cancelled,
    }))
}

/// POST /api/subscriptions/{id}/retry-integration - Operator provisioning retry
pub async fn retry_integration(
    State(state): State<BillingAppState>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .coordinator
        .retry_organization_creation(subscription_id)
        .await?;
    Ok(Json(RetryIntegrationResponse::new(subscription_id, outcome)))
}

/// GET /health - Liveness
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
