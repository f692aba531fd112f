use crate::config::AppState;
use crate::middleware::auth::require_bearer;
use anyhow::Result;
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use start_defender_core::{DefenderError, MANAGER_PATH};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    if state.auth_tokens.is_empty() {
        tracing::warn!("No inbound tokens configured, manager endpoints are unauthenticated");
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn manager_route(name: &str) -> String {
    format!("{MANAGER_PATH}/{name}")
}

/// Create the API router
pub(crate) fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route(&manager_route("test_endpoint"), get(handlers::test_endpoint))
        .route(
            &manager_route("splunk_start_defender_conf"),
            get(handlers::get_conf),
        )
        .route(&manager_route("get_account"), post(handlers::get_account))
        .route(
            &manager_route("relay_circ_get_status"),
            post(handlers::relay_circ_get_status),
        )
        .route(
            &manager_route("relay_circ_start_scan"),
            post(handlers::relay_circ_start_scan),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .with_state(state)
}

/// Envelope every endpoint answers with: the payload is the HTTP body and
/// `status` the HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub payload: Value,
    pub status: StatusCode,
}

impl ApiResponse {
    pub fn ok(payload: Value) -> Self {
        Self {
            payload,
            status: StatusCode::OK,
        }
    }

    /// Structured failure naming the account.
    pub fn failure(account: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            payload: json!({
                "status": "failure",
                "message": message.into(),
                "account": account,
            }),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failure of the vendor or relay call itself. Carries the failure
    /// envelope plus the `action`/`exception` keys relay callers parse.
    pub fn action_failure(account: &str, exception: impl Into<String>) -> Self {
        let exception = exception.into();
        Self {
            payload: json!({
                "status": "failure",
                "message": exception,
                "account": account,
                "action": "failure",
                "exception": exception,
            }),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn from_error(account: &str, err: &DefenderError) -> Self {
        tracing::error!(account, "{}", err);
        if err.is_configuration() {
            Self::failure(Some(err.account().unwrap_or(account)), err.to_string())
        } else {
            Self::action_failure(account, err.to_string())
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.payload)).into_response()
    }
}

/// Parsed request body of a manager endpoint.
#[derive(Debug, PartialEq)]
pub enum Request<T> {
    Describe,
    Execute(T),
}

/// Interpret a request body.
///
/// `describe=true` always yields the usage document. A missing or
/// unparseable body yields it too when the endpoint needs arguments;
/// endpoints without arguments execute instead.
pub fn parse_request<T: DeserializeOwned>(body: &[u8], requires_body: bool) -> Request<T> {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();

    if parsed.as_ref().is_some_and(wants_describe) {
        return Request::Describe;
    }

    let value = match parsed {
        Some(value) => value,
        None if requires_body => return Request::Describe,
        None => Value::Object(Default::default()),
    };

    match serde_json::from_value(value) {
        Ok(args) => Request::Execute(args),
        Err(e) => {
            tracing::debug!("Request body does not match the endpoint options: {}", e);
            Request::Describe
        }
    }
}

fn wants_describe(body: &Value) -> bool {
    match body.get("describe") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
