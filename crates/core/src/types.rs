use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings conf section holding the `role` and `logging` stanzas.
pub const SETTINGS_CONF: &str = "splunk_start_defender_settings";

/// Account conf section, one stanza per account name.
pub const ACCOUNT_CONF: &str = "splunk_start_defender_account";

/// Realm under which account credentials are stored.
pub const CREDENTIAL_REALM: &str =
    "__REST_CREDENTIAL__#splunk_start_defender#configs/conf-splunk_start_defender_account";

/// Account used by the generating command when none is given.
pub const DEFAULT_ACCOUNT: &str = "circapi_defender";

/// Base path of the manager endpoints served by every instance.
pub const MANAGER_PATH: &str = "/services/splunk_start_defender/manager";

/// Deployment role of this instance, as stored in `role/instance_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceRole {
    /// Reaches the vendor API directly.
    #[serde(rename = "splunk_relay")]
    Relay,
    /// Delegates every call to a trusted relay.
    #[serde(rename = "splunk_cloud")]
    Cloud,
}

impl InstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relay => "splunk_relay",
            Self::Cloud => "splunk_cloud",
        }
    }

    /// Token shape this role expects to find in the secret store.
    pub fn token_shape(&self) -> TokenShape {
        match self {
            Self::Relay => TokenShape::CircToken,
            Self::Cloud => TokenShape::RelayToken,
        }
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "splunk_relay" => Ok(Self::Relay),
            "splunk_cloud" => Ok(Self::Cloud),
            other => Err(format!("unknown instance role: {other:?}")),
        }
    }
}

/// JSON key a bearer token is embedded under inside a stored secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenShape {
    CircToken,
    RelayToken,
}

impl TokenShape {
    pub fn key(&self) -> &'static str {
        match self {
            Self::CircToken => "circ_token",
            Self::RelayToken => "relay_token",
        }
    }
}

impl fmt::Display for TokenShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Verbosity configured in the `logging/loglevel` stanza key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Parse a level name the way the settings UI writes it. Unknown names
    /// return `None` so the caller can decide on a fallback.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" | "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" | "FATAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Directive understood by `tracing` filters. `Critical` has no
    /// counterpart and maps onto `error`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

/// Logging section of the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub loglevel: LogLevel,
}

/// Result of reading the settings section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// `None` when the `role` stanza is missing or holds an unknown value.
    pub role: Option<InstanceRole>,
    pub logging: LoggingSettings,
}

/// Connection settings of one account stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circ_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
}

/// Scan action requested by a caller. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub account: String,
    pub computername: String,
    #[serde(default)]
    pub fullscan: bool,
}

/// The two actions the gateway can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAction {
    GetStatus,
    StartScan { fullscan: bool },
}

impl ScanAction {
    /// Name of the relay endpoint performing this action.
    pub fn relay_endpoint(&self) -> &'static str {
        match self {
            Self::GetStatus => "relay_circ_get_status",
            Self::StartScan { .. } => "relay_circ_start_scan",
        }
    }

    pub fn fullscan(&self) -> Option<bool> {
        match self {
            Self::GetStatus => None,
            Self::StartScan { fullscan } => Some(*fullscan),
        }
    }
}

/// Tag attached to records emitted by the generating command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    Requested,
    Success,
    Failure,
}

/// One event emitted by the generating command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(rename = "_time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "_raw")]
    pub raw: serde_json::Value,
}

impl ScanRecord {
    pub fn new(raw: serde_json::Value) -> Self {
        Self {
            time: Utc::now(),
            raw,
        }
    }

    /// Action tag of the record, if it carries one.
    pub fn action(&self) -> Option<RecordAction> {
        self.raw
            .get("action")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}
