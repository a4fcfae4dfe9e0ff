//! HTTP client for the Church Directory backend.
//!
//! JSON over HTTPS with a bearer key. Only 200 and 201 count as success,
//! and a success body must be JSON.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

use crate::domain::foundation::SubscriptionId;
use crate::ports::{BackendError, CreateOrganizationRequest, CreatedOrganization, OrganizationBackend};

const USER_AGENT: &str = "ChurchDirectoryMarketing/1.0";
const MAX_ERROR_BODY: usize = 500;

#[derive(Clone)]
pub struct BackendApiConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl BackendApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct BackendApiClient {
    base_url: String,
    api_key: SecretString,
    http: reqwest::Client,
}

impl BackendApiClient {
    pub fn new(config: BackendApiConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            http,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, BackendError> {
        let url = self.url(endpoint);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.api_key.expose_secret());
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let err = classify_transport_error(&e);
            tracing::error!(%method, %url, error = %err, "Backend API request failed");
            err
        })?;

        let status = response.status().as_u16();
        tracing::info!(%method, %url, status, "Backend API response");

        let text = response.text().await.map_err(|e| classify_transport_error(&e))?;

        if status != 200 && status != 201 {
            let err = BackendError::Http {
                status,
                body: truncate(&text, MAX_ERROR_BODY),
            };
            tracing::error!(%method, %url, error = %err, "Backend API error");
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::warn!(
                %method,
                %url,
                body = %truncate(&text, 200),
                "Backend API returned non-JSON response"
            );
            BackendError::MalformedResponse(e.to_string())
        })
    }
}

fn classify_transport_error(err: &reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Connection(err.to_string())
    }
}

/// Cuts `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> String {
    if text.is_empty() {
        return "No error message".to_string();
    }
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// `organization_id` may come back as a string or a number.
fn organization_id_from(body: &Value) -> Option<String> {
    match body.get("organization_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl OrganizationBackend for BackendApiClient {
    async fn create_organization(
        &self,
        request: &CreateOrganizationRequest,
    ) -> Result<CreatedOrganization, BackendError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;
        let body = self
            .request(
                Method::POST,
                "api/public/organizations/create-from-marketing/",
                Some(&payload),
            )
            .await?;

        let organization_id = organization_id_from(&body).ok_or_else(|| {
            BackendError::MalformedResponse("response has no organization_id".to_string())
        })?;
        let tenant_slug = body
            .get("tenant_slug")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(CreatedOrganization {
            organization_id,
            tenant_slug,
            raw: body,
        })
    }

    async fn get_organization_status(&self, organization_id: &str) -> Result<Value, BackendError> {
        self.request(
            Method::GET,
            &format!("api/organizations/{}/status/", organization_id),
            None,
        )
        .await
    }

    async fn update_subscription_status(
        &self,
        organization_id: &str,
        status: &str,
        subscription_data: Value,
    ) -> Result<Value, BackendError> {
        let body = json!({
            "status": status,
            "subscription_data": subscription_data,
        });
        self.request(
            Method::PATCH,
            &format!("api/organizations/{}/subscription/", organization_id),
            Some(&body),
        )
        .await
    }

    async fn cancel_organization(
        &self,
        organization_id: &str,
        subscription_id: &SubscriptionId,
    ) -> Result<Value, BackendError> {
        let body = json!({
            "action": "cancel",
            "cancellation_reason": "subscription_cancelled",
            "marketing_subscription_id": subscription_id.to_string(),
        });
        self.request(
            Method::POST,
            &format!("api/organizations/{}/cancel/", organization_id),
            Some(&body),
        )
        .await
    }

    async fn test_connection(&self) -> Result<Value, BackendError> {
        self.request(Method::GET, "api/health/", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::test_support::pending_subscription;
    use mockito::Matcher;

    fn client(url: &str) -> BackendApiClient {
        BackendApiClient::new(BackendApiConfig::new(
            url,
            SecretString::new("backend-key".into()),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn create_organization_parses_id_and_slug() {
        let mut server = mockito::Server::new_async().await;
        let sub = pending_subscription("pat@grace.org");
        let mock = server
            .mock("POST", "/api/public/organizations/create-from-marketing/")
            .match_header("authorization", "Bearer backend-key")
            .match_header("user-agent", USER_AGENT)
            .match_body(Matcher::PartialJson(json!({
                "name": "Grace Fellowship",
                "contact_email": "pat@grace.org",
                "marketing_subscription_id": sub.id.to_string(),
            })))
            .with_status(201)
            .with_body(r#"{"organization_id": 42, "tenant_slug": "grace"}"#)
            .create_async()
            .await;

        let created = client(&server.url())
            .create_organization(&CreateOrganizationRequest::from_subscription(&sub))
            .await
            .unwrap();

        assert_eq!(created.organization_id, "42");
        assert_eq!(created.tenant_slug.as_deref(), Some("grace"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_carries_truncated_body() {
        let mut server = mockito::Server::new_async().await;
        let long_body = "x".repeat(900);
        server
            .mock("POST", "/api/public/organizations/create-from-marketing/")
            .with_status(500)
            .with_body(long_body)
            .create_async()
            .await;

        let err = client(&server.url())
            .create_organization(&CreateOrganizationRequest::from_subscription(
                &pending_subscription("a@b.org"),
            ))
            .await
            .unwrap_err();

        match err {
            BackendError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("expected Http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn accepted_status_is_not_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/health/")
            .with_status(202)
            .with_body("{}")
            .create_async()
            .await;

        let err = client(&server.url()).test_connection().await.unwrap_err();
        assert!(matches!(err, BackendError::Http { status: 202, .. }));
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/health/")
            .with_status(200)
            .with_body("<html>ok</html>")
            .create_async()
            .await;

        let err = client(&server.url()).test_connection().await.unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn cancel_sends_reason_and_subscription_id() {
        let mut server = mockito::Server::new_async().await;
        let id = SubscriptionId::new();
        let mock = server
            .mock("POST", "/api/organizations/org-7/cancel/")
            .match_body(Matcher::Json(json!({
                "action": "cancel",
                "cancellation_reason": "subscription_cancelled",
                "marketing_subscription_id": id.to_string(),
            })))
            .with_status(200)
            .with_body(r#"{"status":"cancelled"}"#)
            .create_async()
            .await;

        client(&server.url())
            .cancel_organization("org-7", &id)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_status_patches_subscription_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/organizations/org-7/subscription/")
            .match_body(Matcher::PartialJson(json!({"status": "active"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client(&server.url())
            .update_subscription_status("org-7", "active", json!({"billing_period": "monthly"}))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_error() {
        let err = client("http://127.0.0.1:1").test_connection().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(300);
        let cut = truncate(&s, 5);
        assert_eq!(cut, "éé");
    }
}
