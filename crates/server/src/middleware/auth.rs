use crate::config::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Extract the bearer token from the authorization header
pub fn extract_bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization")?;
    let auth_str = auth_header.to_str().ok()?;

    let token = auth_str.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Reject manager calls that do not carry one of the configured tokens.
/// With no tokens configured every request passes.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if state.auth_tokens.is_empty() {
        return next.run(req).await;
    }

    match extract_bearer_from_headers(req.headers()) {
        Some(token) if state.auth_tokens.iter().any(|t| *t == token) => next.run(req).await,
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Rejected request with unknown token");
            unauthorized()
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "Rejected request without bearer token");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "failure",
            "message": "Authentication required",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_static("Bearer token123"),
        );

        assert_eq!(
            extract_bearer_from_headers(&headers),
            Some("token123".to_string())
        );
    }

    #[test]
    fn test_extract_bearer_missing_or_other_scheme() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_from_headers(&headers), None);

        let mut basic = HeaderMap::new();
        basic.insert("Authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_from_headers(&basic), None);

        let mut empty = HeaderMap::new();
        empty.insert("Authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_from_headers(&empty), None);
    }
}
