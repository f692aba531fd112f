//! Error types for the start-defender transport.

use start_defender_core::DefenderError;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while talking to the vendor or a relay.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream answered with a success status but a body that is not JSON.
    #[error("Invalid JSON body (status {status}): {source}")]
    InvalidBody {
        status: u16,
        body: String,
        source: serde_json::Error,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TransportError {
    /// Upstream status code, when a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::InvalidBody { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<TransportError> for DefenderError {
    fn from(err: TransportError) -> Self {
        let status_code = err.status_code();
        let body = match err {
            TransportError::Api { body, .. } | TransportError::InvalidBody { body, .. } => body,
            other => other.to_string(),
        };

        DefenderError::UpstreamCallFailed { status_code, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_maps_to_upstream_failure() {
        let err: DefenderError = TransportError::Api {
            status: 403,
            body: "forbidden".to_string(),
        }
        .into();

        match err {
            DefenderError::UpstreamCallFailed { status_code, body } => {
                assert_eq!(status_code, Some(403));
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_config_error_has_no_status() {
        let err: DefenderError = TransportError::Config("bad token".to_string()).into();
        assert!(matches!(
            err,
            DefenderError::UpstreamCallFailed { status_code: None, .. }
        ));
    }

    #[test]
    fn test_invalid_body_keeps_status_and_body() {
        let source = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        let err: DefenderError = TransportError::InvalidBody {
            status: 200,
            body: "<html>".to_string(),
            source,
        }
        .into();

        match err {
            DefenderError::UpstreamCallFailed { status_code, body } => {
                assert_eq!(status_code, Some(200));
                assert_eq!(body, "<html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
