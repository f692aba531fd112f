//! HTTP transport for vendor and relay calls.

use crate::config::ClientConfig;
use crate::error::{TransportError, TransportResult};
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use start_defender_core::gateway::{RelayRequest, ScanTransport};
use start_defender_core::{DefenderResult, ScanAction, MANAGER_PATH};
use std::sync::Arc;
use tracing::{debug, warn};

/// reqwest-backed [`ScanTransport`].
///
/// A fresh client is built for every call; no connection state is shared
/// between invocations.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Build a client carrying the bearer token.
    fn session(&self, token: &str, browser_agent: bool) -> TransportResult<Client> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| TransportError::Config("Invalid bearer token format".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let mut builder = Client::builder()
            .timeout(self.config.timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(!self.config.verify_tls);

        if browser_agent {
            builder = builder.user_agent(self.config.user_agent.as_str());
        }

        Ok(builder.build()?)
    }

    /// Send the request and decode a JSON body from a 2xx response.
    async fn execute(&self, request: RequestBuilder) -> TransportResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Upstream call failed");
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| TransportError::InvalidBody {
            status: status.as_u16(),
            body,
            source,
        })
    }

    /// `POST <circ_url>` with the computer name (and fullscan flag) as query
    /// parameters.
    pub async fn vendor(
        &self,
        circ_url: &str,
        circ_token: &str,
        computername: &str,
        action: ScanAction,
    ) -> TransportResult<Value> {
        let url = url::Url::parse(circ_url)?;
        debug!(url = %url, ?action, "POST vendor request");

        let mut query = vec![("computername", computername.to_string())];
        if let Some(fullscan) = action.fullscan() {
            query.push(("fullscan", fullscan_param(fullscan).to_string()));
        }

        let client = self.session(circ_token, true)?;
        self.execute(client.post(url).query(&query)).await
    }

    /// `POST <relay_url>/services/.../relay_circ_*` with a JSON body.
    pub async fn relay(
        &self,
        relay_url: &str,
        relay_token: &str,
        action: ScanAction,
        request: &RelayRequest,
    ) -> TransportResult<Value> {
        let url = url::Url::parse(&format!(
            "{}{}/{}",
            relay_url.trim_end_matches('/'),
            MANAGER_PATH,
            action.relay_endpoint()
        ))?;
        debug!(url = %url, "POST relay request");

        let client = self.session(relay_token, false)?;
        self.execute(client.post(url).json(request)).await
    }
}

/// The vendor API expects Python-style booleans.
fn fullscan_param(fullscan: bool) -> &'static str {
    if fullscan {
        "True"
    } else {
        "False"
    }
}

#[async_trait::async_trait]
impl ScanTransport for HttpTransport {
    async fn call_vendor(
        &self,
        circ_url: &str,
        circ_token: &str,
        computername: &str,
        action: ScanAction,
    ) -> DefenderResult<Value> {
        Ok(self.vendor(circ_url, circ_token, computername, action).await?)
    }

    async fn call_relay(
        &self,
        relay_url: &str,
        relay_token: &str,
        action: ScanAction,
        request: &RelayRequest,
    ) -> DefenderResult<Value> {
        Ok(self.relay(relay_url, relay_token, action, request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use start_defender_core::DefenderError;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new(ClientConfig::default().with_timeout(Duration::from_secs(5)))
    }

    fn scan_body(fullscan: Option<bool>) -> RelayRequest {
        RelayRequest {
            account: "acme".to_string(),
            computername: "PC-1".to_string(),
            fullscan,
        }
    }

    #[tokio::test]
    async fn test_vendor_get_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/scan"))
            .and(query_param("computername", "PC-1"))
            .and(header("Authorization", "Bearer circ-T"))
            .and(header_regex("User-Agent", r"^Mozilla/5\.0 "))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = transport()
            .call_vendor(
                &format!("{}/api/scan", server.uri()),
                "circ-T",
                "PC-1",
                ScanAction::GetStatus,
            )
            .await
            .unwrap();

        assert_eq!(result, serde_json::json!({"state": "ok"}));
    }

    #[tokio::test]
    async fn test_vendor_start_scan_sends_fullscan() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/scan"))
            .and(query_param("computername", "PC-1"))
            .and(query_param("fullscan", "True"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({"queued": true})))
            .expect(1)
            .mount(&server)
            .await;

        let result = transport()
            .call_vendor(
                &format!("{}/api/scan", server.uri()),
                "circ-T",
                "PC-1",
                ScanAction::StartScan { fullscan: true },
            )
            .await
            .unwrap();

        assert_eq!(result["queued"], true);
    }

    #[tokio::test]
    async fn test_relay_delegation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(
                "/services/splunk_start_defender/manager/relay_circ_start_scan",
            ))
            .and(header("Authorization", "Bearer relay-R"))
            .and(body_json(serde_json::json!({
                "account": "acme",
                "computername": "PC-1",
                "fullscan": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"scan": "started"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = transport()
            .call_relay(
                &format!("{}/", server.uri()),
                "relay-R",
                ScanAction::StartScan { fullscan: false },
                &scan_body(Some(false)),
            )
            .await
            .unwrap();

        assert_eq!(result["scan"], "started");
    }

    #[tokio::test]
    async fn test_relay_status_body_has_no_fullscan() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(
                "/services/splunk_start_defender/manager/relay_circ_get_status",
            ))
            .and(body_json(serde_json::json!({
                "account": "acme",
                "computername": "PC-1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "idle"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = transport()
            .call_relay(&server.uri(), "relay-R", ScanAction::GetStatus, &scan_body(None))
            .await
            .unwrap();

        assert_eq!(result["state"], "idle");
    }

    #[tokio::test]
    async fn test_non_success_maps_to_upstream_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/scan"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = transport()
            .call_vendor(
                &format!("{}/api/scan", server.uri()),
                "stale",
                "PC-1",
                ScanAction::GetStatus,
            )
            .await
            .unwrap_err();

        match err {
            DefenderError::UpstreamCallFailed { status_code, body } => {
                assert_eq!(status_code, Some(401));
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_a_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let result = transport()
            .call_vendor(&server.uri(), "T", "PC-1", ScanAction::GetStatus)
            .await;

        match result {
            Err(DefenderError::UpstreamCallFailed { status_code, body }) => {
                assert_eq!(status_code, Some(200));
                assert_eq!(body, "<html>login</html>");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        // nothing listens on port 9 of localhost
        let err = transport()
            .call_vendor("http://127.0.0.1:9/scan", "T", "PC-1", ScanAction::GetStatus)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DefenderError::UpstreamCallFailed { status_code: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = transport()
            .vendor("not a url", "T", "PC-1", ScanAction::GetStatus)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let err = transport().session("bad\ntoken", true).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }
}
