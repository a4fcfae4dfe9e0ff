//! Stripe REST adapter for [`PaymentGateway`].
//!
//! Form-encoded requests with the secret key as basic-auth user. Only the
//! handful of endpoints checkout and cancellation need are wrapped.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::ports::{
    CheckoutSessionRequest, CreatedCheckoutSession, CustomerRequest, GatewayCheckoutSession,
    GatewayCustomer, PaymentError, PaymentErrorCode, PaymentGateway,
};

use super::types::{StripeCheckoutSession, StripeCustomer, StripeErrorBody, StripeList};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    api_key: SecretString,
    api_base_url: String,
    timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Points the adapter at a different host (tests use a local mock server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::provider(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PaymentError> {
        let response = self.authed(request).send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Stripe request failed");
            PaymentError::network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = error_from_response(status.as_u16(), &body);
            tracing::error!(
                operation,
                status = status.as_u16(),
                code = %err.code,
                error = %err.message,
                "Stripe API error"
            );
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })
    }

    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StripeCustomer>, PaymentError> {
        let request = self
            .http_client
            .get(self.url("customers"))
            .query(&[("email", email), ("limit", "1")]);
        let list: StripeList<StripeCustomer> = self.send("list_customers", request).await?;
        Ok(list.data.into_iter().find(|c| !c.deleted))
    }
}

/// Maps a non-2xx Stripe response to a [`PaymentError`].
fn error_from_response(status: u16, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<StripeErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.error.message.clone())
        .unwrap_or_else(|| format!("Stripe API error (HTTP {})", status));

    let error_type = parsed.as_ref().and_then(|b| b.error.error_type.as_deref());
    let mut err = PaymentError::new(error_code(status, error_type), message);
    if let Some(provider_code) = parsed.and_then(|b| b.error.code) {
        err = err.with_provider_code(provider_code);
    }
    err
}

/// Status decides for auth, not-found, throttling and server faults;
/// otherwise Stripe's error `type` wins over the status family.
fn error_code(status: u16, error_type: Option<&str>) -> PaymentErrorCode {
    match (status, error_type) {
        (401 | 403, _) => PaymentErrorCode::AuthenticationError,
        (404, _) => PaymentErrorCode::NotFound,
        (429, _) | (_, Some("rate_limit_error")) => PaymentErrorCode::RateLimitExceeded,
        (500..=599, _) => PaymentErrorCode::NetworkError,
        (_, Some("authentication_error")) => PaymentErrorCode::AuthenticationError,
        (_, Some("card_error" | "invalid_request_error" | "idempotency_error")) => {
            PaymentErrorCode::InvalidRequest
        }
        (400 | 402, _) => PaymentErrorCode::InvalidRequest,
        _ => PaymentErrorCode::ProviderError,
    }
}

/// Flattens a checkout request into Stripe's bracketed form encoding.
pub(crate) fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        (
            "client_reference_id".into(),
            request.client_reference_id.clone(),
        ),
    ];

    match &request.customer_id {
        Some(customer) => form.push(("customer".into(), customer.clone())),
        None => form.push(("customer_email".into(), request.customer_email.clone())),
    }

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((
            format!("{}[price_data][currency]", prefix),
            request.currency.clone(),
        ));
        form.push((
            format!("{}[price_data][product_data][name]", prefix),
            item.name.clone(),
        ));
        if let Some(description) = &item.description {
            form.push((
                format!("{}[price_data][product_data][description]", prefix),
                description.clone(),
            ));
        }
        form.push((
            format!("{}[price_data][unit_amount]", prefix),
            item.unit_amount.cents().to_string(),
        ));
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
    }

    let mut keys: Vec<_> = request.metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{}]", key), request.metadata[key].clone()));
        form.push((
            format!("payment_intent_data[metadata][{}]", key),
            request.metadata[key].clone(),
        ));
    }

    if request.collect_phone_number {
        form.push(("phone_number_collection[enabled]".into(), "true".into()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripePaymentAdapter {
    async fn find_or_create_customer(
        &self,
        request: CustomerRequest,
    ) -> Result<GatewayCustomer, PaymentError> {
        if let Some(existing) = self.find_customer_by_email(&request.email).await? {
            tracing::debug!(customer_id = %existing.id, "Reusing Stripe customer");
            return Ok(GatewayCustomer {
                id: existing.id,
                email: existing.email,
            });
        }

        let mut form = vec![
            ("email".to_string(), request.email.clone()),
            ("name".to_string(), request.name.clone()),
        ];
        if let Some(phone) = &request.phone {
            form.push(("phone".into(), phone.clone()));
        }
        for (k, v) in &request.metadata {
            form.push((format!("metadata[{}]", k), v.clone()));
        }

        let created: StripeCustomer = self
            .send(
                "create_customer",
                self.http_client.post(self.url("customers")).form(&form),
            )
            .await?;

        tracing::info!(customer_id = %created.id, "Created Stripe customer");
        Ok(GatewayCustomer {
            id: created.id,
            email: created.email.or(Some(request.email)),
        })
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CreatedCheckoutSession, PaymentError> {
        let mut builder = self
            .http_client
            .post(self.url("checkout/sessions"))
            .form(&checkout_form(&request));
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let session: StripeCheckoutSession = self.send("create_checkout_session", builder).await?;
        Ok(CreatedCheckoutSession {
            id: session.id,
            url: session.url,
            payment_intent: session.payment_intent,
            expires_at: session.expires_at,
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GatewayCheckoutSession>, PaymentError> {
        let request = self
            .http_client
            .get(self.url(&format!("checkout/sessions/{}", session_id)));
        match self
            .send::<StripeCheckoutSession>("retrieve_checkout_session", request)
            .await
        {
            Ok(session) => Ok(Some(GatewayCheckoutSession {
                id: session.id,
                status: session.status,
                payment_status: session.payment_status,
                payment_intent: session.payment_intent,
                customer: session.customer,
            })),
            Err(e) if e.code == PaymentErrorCode::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn expire_checkout_session(&self, session_id: &str) -> Result<(), PaymentError> {
        let request = self
            .http_client
            .post(self.url(&format!("checkout/sessions/{}/expire", session_id)));
        self.send::<serde_json::Value>("expire_checkout_session", request)
            .await
            .map(|_| ())
    }

    async fn cancel_recurring_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<(), PaymentError> {
        let request = self
            .http_client
            .delete(self.url(&format!("subscriptions/{}", gateway_subscription_id)));
        self.send::<serde_json::Value>("cancel_subscription", request)
            .await
            .map(|_| ())
    }
}
