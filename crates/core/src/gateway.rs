use crate::config::ConfigResolver;
use crate::error::{DefenderError, DefenderResult};
use crate::secrets::CredentialResolver;
use crate::types::{InstanceRole, ScanAction, ScanRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Body of a delegated call to a relay's manager endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub account: String,
    pub computername: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fullscan: Option<bool>,
}

/// Outbound calls of the gateway. The production implementation lives in
/// the sdk crate; each call is a bounded request/response exchange.
#[async_trait::async_trait]
pub trait ScanTransport: Send + Sync {
    /// `POST <circ_url>?computername=..[&fullscan=..]` with the vendor token.
    async fn call_vendor(
        &self,
        circ_url: &str,
        circ_token: &str,
        computername: &str,
        action: ScanAction,
    ) -> DefenderResult<Value>;

    /// `POST <relay_url>/services/.../relay_circ_*` with the relay token.
    async fn call_relay(
        &self,
        relay_url: &str,
        relay_token: &str,
        action: ScanAction,
        request: &RelayRequest,
    ) -> DefenderResult<Value>;
}

/// Force an `https://` scheme and drop trailing slashes.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let rest = strip_scheme(url, "https://")
        .or_else(|| strip_scheme(url, "http://"))
        .unwrap_or(url);
    let url = format!("https://{rest}");

    url.trim_end_matches('/').to_string()
}

fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    let prefix = url.get(..scheme.len())?;
    prefix
        .eq_ignore_ascii_case(scheme)
        .then(|| &url[scheme.len()..])
}

/// Endpoint and token resolved for one account under the instance role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleConnection {
    Relay { circ_url: String, circ_token: String },
    Cloud { relay_url: String, relay_token: String },
}

impl RoleConnection {
    pub fn role(&self) -> InstanceRole {
        match self {
            Self::Relay { .. } => InstanceRole::Relay,
            Self::Cloud { .. } => InstanceRole::Cloud,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Relay { circ_url, .. } => circ_url,
            Self::Cloud { relay_url, .. } => relay_url,
        }
    }

    /// Connection details as returned by `get_account`.
    pub fn to_payload(&self, account: &str) -> Value {
        match self {
            Self::Relay { circ_url, circ_token } => serde_json::json!({
                "status": "success",
                "instance_role": self.role(),
                "account": account,
                "circ_url": circ_url,
                "circ_token": circ_token,
            }),
            Self::Cloud { relay_url, relay_token } => serde_json::json!({
                "status": "success",
                "instance_role": self.role(),
                "account": account,
                "relay_url": relay_url,
                "relay_token": relay_token,
            }),
        }
    }
}

/// Resolves where and how to call for an account, then performs the call
/// either against the vendor or through a relay.
#[derive(Clone)]
pub struct ScanGateway {
    config: ConfigResolver,
    credentials: CredentialResolver,
    transport: Arc<dyn ScanTransport>,
}

impl ScanGateway {
    pub fn new(
        config: ConfigResolver,
        credentials: CredentialResolver,
        transport: Arc<dyn ScanTransport>,
    ) -> Self {
        Self {
            config,
            credentials,
            transport,
        }
    }

    pub fn config(&self) -> &ConfigResolver {
        &self.config
    }

    /// Resolve URL and token of `account` for `role`. Fails before any
    /// network activity when the account, role, URL or token is missing.
    pub async fn resolve(
        &self,
        role: Option<InstanceRole>,
        account: &str,
    ) -> DefenderResult<RoleConnection> {
        let details = self.config.get_account(account).await?;
        let role = role.ok_or_else(|| DefenderError::missing_role(account))?;

        let (raw_url, key) = match role {
            InstanceRole::Relay => (details.circ_url, "circ_url"),
            InstanceRole::Cloud => (details.relay_url, "relay_url"),
        };
        let url = normalize_url(&raw_url.ok_or_else(|| DefenderError::missing_url(account, role, key))?);

        let token = self
            .credentials
            .find_token(account, role.token_shape())
            .await?
            .ok_or_else(|| DefenderError::missing_token(account, role))?;

        tracing::debug!(account, role = %role, url = %url, "Resolved account connection");

        Ok(match role {
            InstanceRole::Relay => RoleConnection::Relay {
                circ_url: url,
                circ_token: token,
            },
            InstanceRole::Cloud => RoleConnection::Cloud {
                relay_url: url,
                relay_token: token,
            },
        })
    }

    /// Perform `action` over an already resolved connection.
    pub async fn dispatch(
        &self,
        connection: &RoleConnection,
        account: &str,
        computername: &str,
        action: ScanAction,
    ) -> DefenderResult<Value> {
        match connection {
            RoleConnection::Relay { circ_url, circ_token } => {
                tracing::info!(account, computername, url = %circ_url, ?action, "Calling vendor API");
                self.transport
                    .call_vendor(circ_url, circ_token, computername, action)
                    .await
            }
            RoleConnection::Cloud { relay_url, relay_token } => {
                tracing::info!(account, computername, url = %relay_url, ?action, "Delegating to relay");
                let request = RelayRequest {
                    account: account.to_string(),
                    computername: computername.to_string(),
                    fullscan: action.fullscan(),
                };
                self.transport
                    .call_relay(relay_url, relay_token, action, &request)
                    .await
            }
        }
    }

    /// Resolve then call, following `role`.
    pub async fn execute(
        &self,
        role: Option<InstanceRole>,
        account: &str,
        computername: &str,
        action: ScanAction,
    ) -> DefenderResult<Value> {
        let connection = self.resolve(role, account).await?;
        self.dispatch(&connection, account, computername, action).await
    }

    pub async fn get_status(
        &self,
        role: Option<InstanceRole>,
        account: &str,
        computername: &str,
    ) -> DefenderResult<Value> {
        self.execute(role, account, computername, ScanAction::GetStatus)
            .await
    }

    pub async fn start_scan(
        &self,
        role: Option<InstanceRole>,
        request: &ScanRequest,
    ) -> DefenderResult<Value> {
        self.execute(
            role,
            &request.account,
            &request.computername,
            ScanAction::StartScan {
                fullscan: request.fullscan,
            },
        )
        .await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingTransport};
    use super::*;
    use crate::config::{MemoryConfigStore, Stanza};
    use crate::secrets::{credential_name, MemorySecretStore, StoredCredential};
    use crate::types::{ACCOUNT_CONF, CREDENTIAL_REALM};

    fn gateway(
        accounts: &[(&str, Option<&str>, Option<&str>)],
        secrets: &[(&str, &str)],
        transport: Arc<RecordingTransport>,
    ) -> ScanGateway {
        let config = MemoryConfigStore::new();
        for (name, circ_url, relay_url) in accounts {
            let mut stanza = Stanza::new(*name);
            if let Some(url) = circ_url {
                stanza = stanza.with("circ_url", *url);
            }
            if let Some(url) = relay_url {
                stanza = stanza.with("relay_url", *url);
            }
            config.put(ACCOUNT_CONF, stanza);
        }

        let store = MemorySecretStore::new();
        for (account, value) in secrets {
            store.push(StoredCredential::new(
                CREDENTIAL_REALM,
                credential_name(account),
                *value,
            ));
        }

        ScanGateway::new(
            ConfigResolver::new(Arc::new(config)),
            CredentialResolver::new(Arc::new(store)),
            transport,
        )
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com/scan"), "https://example.com/scan");
        assert_eq!(normalize_url("https://example.com/scan/"), "https://example.com/scan");
        assert_eq!(normalize_url("http://example.com/scan"), "https://example.com/scan");
        assert_eq!(normalize_url("https://relay:8089//"), "https://relay:8089");
        assert_eq!(normalize_url("HTTPS://Example.com/scan"), "https://Example.com/scan");
        assert_eq!(normalize_url("Http://example.com/"), "https://example.com");
    }

    #[tokio::test]
    async fn test_relay_get_status_calls_vendor() {
        let transport = Arc::new(RecordingTransport::answering(Ok(
            serde_json::json!({"state": "ok"}),
        )));
        let gw = gateway(
            &[("acme", Some("example.com/scan/"), None)],
            &[("acme", r#"{"circ_token": "C"}"#)],
            transport.clone(),
        );

        let result = gw
            .get_status(Some(InstanceRole::Relay), "acme", "PC-1")
            .await
            .unwrap();

        assert_eq!(result, serde_json::json!({"state": "ok"}));
        assert_eq!(
            transport.calls(),
            vec![Call::Vendor {
                url: "https://example.com/scan".to_string(),
                token: "C".to_string(),
                computername: "PC-1".to_string(),
                action: ScanAction::GetStatus,
            }]
        );
    }

    #[tokio::test]
    async fn test_cloud_start_scan_delegates_to_relay() {
        let transport = Arc::new(RecordingTransport::answering(Ok(
            serde_json::json!({"scan": "queued"}),
        )));
        let gw = gateway(
            &[("acme", Some("vendor.example.com"), Some("relay.example.com:8089"))],
            &[("acme", r#"{"relay_token": "R"}"#)],
            transport.clone(),
        );

        let request = ScanRequest {
            account: "acme".to_string(),
            computername: "PC-1".to_string(),
            fullscan: true,
        };
        gw.start_scan(Some(InstanceRole::Cloud), &request)
            .await
            .unwrap();

        assert_eq!(
            transport.calls(),
            vec![Call::Relay {
                url: "https://relay.example.com:8089".to_string(),
                token: "R".to_string(),
                action: ScanAction::StartScan { fullscan: true },
                request: RelayRequest {
                    account: "acme".to_string(),
                    computername: "PC-1".to_string(),
                    fullscan: Some(true),
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_cloud_never_uses_circ_token() {
        let transport = Arc::new(RecordingTransport::answering(Ok(serde_json::json!({}))));
        let gw = gateway(
            &[("acme", None, Some("relay.example.com"))],
            &[("acme", r#"{"circ_token": "C"}"#)],
            transport.clone(),
        );

        let err = gw
            .get_status(Some(InstanceRole::Cloud), "acme", "PC-1")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("relay_token could not be retrieved"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account_makes_no_call() {
        let transport = Arc::new(RecordingTransport::answering(Ok(serde_json::json!({}))));
        let gw = gateway(
            &[("acme", Some("example.com"), None)],
            &[("acme", r#"{"circ_token": "C"}"#)],
            transport.clone(),
        );

        let err = gw
            .get_status(Some(InstanceRole::Relay), "ghost", "PC-1")
            .await
            .unwrap_err();

        assert!(matches!(err, DefenderError::ConfigNotFound { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_role_fails_fast() {
        let transport = Arc::new(RecordingTransport::answering(Ok(serde_json::json!({}))));
        let gw = gateway(
            &[("acme", Some("example.com"), None)],
            &[("acme", r#"{"circ_token": "C"}"#)],
            transport.clone(),
        );

        let err = gw.get_status(None, "acme", "PC-1").await.unwrap_err();

        assert!(matches!(err, DefenderError::ConfigurationInconsistent { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_url_fails_fast() {
        let transport = Arc::new(RecordingTransport::answering(Ok(serde_json::json!({}))));
        let gw = gateway(
            &[("acme", None, None)],
            &[("acme", r#"{"circ_token": "C"}"#)],
            transport.clone(),
        );

        let err = gw
            .get_status(Some(InstanceRole::Relay), "acme", "PC-1")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("circ_url"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_passed_through() {
        let transport = Arc::new(RecordingTransport::answering(Err(
            DefenderError::UpstreamCallFailed {
                status_code: Some(503),
                body: "down".to_string(),
            },
        )));
        let gw = gateway(
            &[("acme", Some("example.com"), None)],
            &[("acme", r#"{"circ_token": "C"}"#)],
            transport.clone(),
        );

        let err = gw
            .get_status(Some(InstanceRole::Relay), "acme", "PC-1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DefenderError::UpstreamCallFailed { status_code: Some(503), .. }
        ));
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_connection_payload() {
        let conn = RoleConnection::Cloud {
            relay_url: "https://relay".to_string(),
            relay_token: "R".to_string(),
        };
        let payload = conn.to_payload("acme");

        assert_eq!(payload["instance_role"], "splunk_cloud");
        assert_eq!(payload["relay_token"], "R");
        assert!(payload.get("circ_url").is_none());
    }
}
