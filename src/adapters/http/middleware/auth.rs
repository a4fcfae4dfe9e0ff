//! Bearer token guard for the backend-facing status endpoints.
//!
//! The church directory backend authenticates with one shared token from
//! configuration. Comparison is constant-time; an unconfigured token
//! rejects every request.
//!
//! ```text
//! Authorization: Bearer <status_api.api_token>
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::adapters::http::error::ApiError;

/// Middleware state: the expected token, if any.
pub type StatusToken = Arc<Option<SecretString>>;

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

pub(crate) fn token_matches(expected: &SecretString, presented: &str) -> bool {
    let expected = expected.expose_secret().as_bytes();
    // unequal lengths compare false
    expected.ct_eq(presented.as_bytes()).into()
}

pub async fn require_status_token(
    State(expected): State<StatusToken>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected.as_ref() else {
        tracing::warn!("Status API token not configured; rejecting request");
        return ApiError::Unauthorized.into_response();
    };
    match bearer(&request) {
        Some(presented) if token_matches(expected, presented) => next.run(request).await,
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Invalid status API token");
            ApiError::Unauthorized.into_response()
        }
        None => ApiError::Unauthorized.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    const TOKEN: &str = "0123456789abcdef0123";

    fn app(token: Option<&str>) -> Router {
        let state: StatusToken = Arc::new(token.map(|t| SecretString::new(t.to_string())));
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, require_status_token))
    }

    async fn status(app: Router, auth: Option<&str>) -> StatusCode {
        let mut request = axum::http::Request::builder().uri("/protected");
        if let Some(auth) = auth {
            request = request.header(header::AUTHORIZATION, auth);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn accepts_matching_token() {
        let auth = format!("Bearer {}", TOKEN);
        assert_eq!(status(app(Some(TOKEN)), Some(&auth)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_wrong_or_missing_token() {
        assert_eq!(
            status(app(Some(TOKEN)), Some("Bearer nope")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(app(Some(TOKEN)), None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(app(Some(TOKEN)), Some(TOKEN)).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unconfigured_token_rejects_everything() {
        let auth = format!("Bearer {}", TOKEN);
        assert_eq!(status(app(None), Some(&auth)).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn token_comparison_handles_length_mismatch() {
        let expected = SecretString::new(TOKEN.to_string());
        assert!(token_matches(&expected, TOKEN));
        assert!(!token_matches(&expected, &TOKEN[..10]));
        assert!(!token_matches(&expected, ""));
    }
}
