//! Configuration types for the start-defender transport.

use std::time::Duration;

/// Browser-like User-Agent the vendor API expects.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/55.0.2883.87 Safari/537.36";

/// Configuration for outbound calls.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout. Every call is bounded by it.
    pub timeout: Duration,
    /// User-Agent sent to the vendor API.
    pub user_agent: String,
    /// Validate TLS certificates of the vendor and relay.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            verify_tls: false,
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
