//! The `start_defender` generating command.
//!
//! A run emits a `requested` record before the outbound call and a second
//! record carrying either the upstream response or the failure.

use crate::gateway::{RoleConnection, ScanGateway};
use crate::types::{RecordAction, ScanAction, ScanRecord, Settings};
use serde_json::{json, Value};

/// Arguments of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub account: String,
    pub computername: String,
    pub action: ScanAction,
    /// User on whose behalf the command runs.
    pub requester: String,
}

/// Generating command over a [`ScanGateway`].
#[derive(Clone)]
pub struct StartDefenderCommand {
    gateway: ScanGateway,
}

impl StartDefenderCommand {
    pub fn new(gateway: ScanGateway) -> Self {
        Self { gateway }
    }

    /// Run the invocation under the role from `settings`.
    ///
    /// Never fails: resolution and upstream errors become a `failure`
    /// record so the caller always gets something to display.
    pub async fn run(&self, settings: &Settings, invocation: &Invocation) -> Vec<ScanRecord> {
        let connection = match self.gateway.resolve(settings.role, &invocation.account).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(account = %invocation.account, "start_defender, resolution failed: {}", e);
                return vec![failure_record(&format!(
                    "start_defender, an exception was encountered, exception=\"{e}\""
                ))];
            }
        };

        let requested = ScanRecord::new(requested_raw(&connection, invocation));
        tracing::info!(record = %requested.raw, "start_defender request");

        let outcome = self
            .gateway
            .dispatch(
                &connection,
                &invocation.account,
                &invocation.computername,
                invocation.action,
            )
            .await;

        let result = match outcome {
            Ok(response) => {
                let record = ScanRecord::new(tag_success(response));
                tracing::info!(record = %record.raw, "start_defender response");
                record
            }
            Err(e) => {
                tracing::error!(account = %invocation.account, "start_defender call failed: {}", e);
                failure_record(&e.to_string())
            }
        };

        vec![requested, result]
    }
}

fn requested_raw(connection: &RoleConnection, invocation: &Invocation) -> Value {
    let target = match connection {
        RoleConnection::Relay { .. } => "circ",
        RoleConnection::Cloud { .. } => "relay",
    };

    let mut raw = json!({
        "action": RecordAction::Requested,
        "requester": invocation.requester,
        "computername": invocation.computername,
        "account": invocation.account,
        "response": format!(
            "sending start_defender request to {}=\"{}\"",
            target,
            connection.url()
        ),
    });
    if let Some(fullscan) = invocation.action.fullscan() {
        raw["fullscan"] = json!(fullscan);
    }
    raw
}

fn tag_success(response: Value) -> Value {
    match response {
        Value::Object(mut map) => {
            map.entry("action").or_insert(json!(RecordAction::Success));
            Value::Object(map)
        }
        other => other,
    }
}

fn failure_record(exception: &str) -> ScanRecord {
    ScanRecord::new(json!({
        "action": RecordAction::Failure,
        "exception": exception,
    }))
}
