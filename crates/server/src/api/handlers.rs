use super::{parse_request, ApiResponse, Request};
use crate::config::AppState;
use axum::{body::Bytes, extract::State};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use start_defender_core::{DefenderError, InstanceRole, ScanAction, Settings};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub account: String,
}

#[derive(Debug, Deserialize)]
pub struct GetStatusRequest {
    pub account: String,
    pub computername: String,
}

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub account: String,
    pub computername: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub fullscan: bool,
}

/// Cloud peers send a JSON bool, hand-written calls often a string.
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid fullscan value: {other}"))),
        },
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => Ok(false),
            Some(f) if f == 1.0 => Ok(true),
            _ => Err(serde::de::Error::custom(format!("invalid fullscan value: {n}"))),
        },
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid fullscan value: {other}"))),
    }
}

/// Read the settings and apply the configured log level.
async fn load_settings(state: &AppState) -> Result<Settings, DefenderError> {
    let settings = state.config().get_conf().await?;
    state.log_control.apply(&settings.logging);
    Ok(settings)
}

pub async fn test_endpoint() -> ApiResponse {
    ApiResponse::ok(json!({
        "resource_endpoint": "test_endpoint",
        "resource_response": "Welcome. Good to see you.",
    }))
}

/// Settings section as `{stanza: {key: value}}`
pub async fn get_conf(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResponse {
    if let Request::Describe = parse_request::<Value>(&body, false) {
        return ApiResponse::ok(json!({
            "describe": "This endpoint retrieves and provide system wide configuration, it requires a GET call with no options:",
            "resource_desc": "Retrieve system wide configuration",
        }));
    }

    match state.config().get_conf_raw().await {
        Ok(conf) => ApiResponse::ok(json!(conf)),
        Err(e) => {
            tracing::error!("Failed to read settings: {}", e);
            ApiResponse::failure(None, e.to_string())
        }
    }
}

/// Connection details (URL and token) of an account under this
/// instance's role
pub async fn get_account(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResponse {
    let req: AccountRequest = match parse_request(&body, true) {
        Request::Execute(req) => req,
        Request::Describe => {
            return ApiResponse::ok(json!({
                "describe": "This endpoint provides connectivity information, it requires a POST call with the following options:",
                "resource_desc": "Retrieve the account configuration",
                "options": [{
                    "account": "The account configuration identifier",
                }],
            }))
        }
    };

    let result = async {
        let settings = load_settings(&state).await?;
        state.gateway.resolve(settings.role, &req.account).await
    }
    .await;

    match result {
        Ok(connection) => ApiResponse::ok(connection.to_payload(&req.account)),
        Err(e) => ApiResponse::from_error(&req.account, &e),
    }
}

/// Vendor get-status call, run locally as a relay
pub async fn relay_circ_get_status(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResponse {
    let req: GetStatusRequest = match parse_request(&body, true) {
        Request::Execute(req) => req,
        Request::Describe => {
            return ApiResponse::ok(json!({
                "describe": "This endpoint runs the action circ get status, it requires a POST call with the following options:",
                "resource_desc": "Run circ get status action",
                "options": [{
                    "account": "The name of the account",
                    "computername": "The computer name",
                }],
            }))
        }
    };

    run_as_relay(&state, &req.account, &req.computername, ScanAction::GetStatus).await
}

/// Vendor start-scan call, run locally as a relay
pub async fn relay_circ_start_scan(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResponse {
    let req: StartScanRequest = match parse_request(&body, true) {
        Request::Execute(req) => req,
        Request::Describe => {
            return ApiResponse::ok(json!({
                "describe": "This endpoint runs the action circ start scan, it requires a POST call with the following options:",
                "resource_desc": "Run circ start scan action",
                "options": [{
                    "account": "The account",
                    "computername": "The computer name",
                    "fullscan": "Run fullscan (boolean)",
                }],
            }))
        }
    };

    run_as_relay(
        &state,
        &req.account,
        &req.computername,
        ScanAction::StartScan {
            fullscan: req.fullscan,
        },
    )
    .await
}

/// Delegated calls always take the relay branch and use this instance's
/// own vendor token.
async fn run_as_relay(
    state: &AppState,
    account: &str,
    computername: &str,
    action: ScanAction,
) -> ApiResponse {
    let result = async {
        load_settings(state).await?;
        state
            .gateway
            .execute(Some(InstanceRole::Relay), account, computername, action)
            .await
    }
    .await;

    match result {
        Ok(response) => ApiResponse::ok(response),
        Err(e) => ApiResponse::from_error(account, &e),
    }
}
