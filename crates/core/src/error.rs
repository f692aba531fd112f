use crate::types::{InstanceRole, TokenShape};

pub type DefenderResult<T> = Result<T, DefenderError>;

/// Failures of a resolve-then-call sequence. Each is terminal for the
/// invocation; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum DefenderError {
    #[error("The account could not be found on this system, check the spelling and your configuration")]
    ConfigNotFound { account: String },

    #[error("There are no account configured yet for this instance.")]
    NoAccountsConfigured { account: String },

    #[error("no {shape} could be extracted for account {account}")]
    TokenNotFound { account: String, shape: TokenShape },

    #[error("{message}")]
    ConfigurationInconsistent { account: String, message: String },

    #[error("upstream call failed, status_code={}, response=\"{body}\"", status_label(.status_code))]
    UpstreamCallFailed {
        status_code: Option<u16>,
        body: String,
    },

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

fn status_label(status_code: &Option<u16>) -> String {
    status_code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl DefenderError {
    /// The role is configured but the token it needs is absent.
    pub fn missing_token(account: &str, role: InstanceRole) -> Self {
        Self::ConfigurationInconsistent {
            account: account.to_string(),
            message: format!(
                "This instance is configured with role {} but the {} could not be retrieved, cannot continue.",
                role,
                role.token_shape()
            ),
        }
    }

    /// The role is unset or unknown.
    pub fn missing_role(account: &str) -> Self {
        Self::ConfigurationInconsistent {
            account: account.to_string(),
            message: "This instance has no valid instance_role configured (expected splunk_relay or splunk_cloud), cannot continue.".to_string(),
        }
    }

    /// The account stanza lacks the URL its role needs.
    pub fn missing_url(account: &str, role: InstanceRole, key: &str) -> Self {
        Self::ConfigurationInconsistent {
            account: account.to_string(),
            message: format!(
                "This instance is configured with role {role} but the account has no {key} configured, cannot continue."
            ),
        }
    }

    /// Account the failure relates to, when known.
    pub fn account(&self) -> Option<&str> {
        match self {
            Self::ConfigNotFound { account }
            | Self::NoAccountsConfigured { account }
            | Self::TokenNotFound { account, .. }
            | Self::ConfigurationInconsistent { account, .. } => Some(account),
            Self::UpstreamCallFailed { .. } | Self::Store(_) => None,
        }
    }

    /// Whether the failure was raised before any network call was attempted.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::UpstreamCallFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_empty_are_distinct() {
        let not_found = DefenderError::ConfigNotFound {
            account: "a".to_string(),
        };
        let empty = DefenderError::NoAccountsConfigured {
            account: "a".to_string(),
        };

        assert!(not_found.to_string().contains("could not be found"));
        assert!(empty.to_string().contains("no account configured"));
        assert_ne!(not_found.to_string(), empty.to_string());
    }

    #[test]
    fn test_missing_token_message_cites_shape() {
        let err = DefenderError::missing_token("acme", InstanceRole::Cloud);
        let msg = err.to_string();
        assert!(msg.contains("splunk_cloud"));
        assert!(msg.contains("relay_token"));
        assert_eq!(err.account(), Some("acme"));
    }

    #[test]
    fn test_upstream_failure_carries_status() {
        let err = DefenderError::UpstreamCallFailed {
            status_code: Some(502),
            body: "bad gateway".to_string(),
        };
        assert!(err.to_string().contains("status_code=502"));
        assert!(!err.is_configuration());

        let transport = DefenderError::UpstreamCallFailed {
            status_code: None,
            body: "connection refused".to_string(),
        };
        assert!(transport.to_string().contains("status_code=none"));
    }
}
