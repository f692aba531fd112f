use crate::logging::LogControl;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use start_defender_core::command::StartDefenderCommand;
use start_defender_core::config::{ConfigResolver, ConfigStore, TomlConfigStore};
use start_defender_core::gateway::{ScanGateway, ScanTransport};
use start_defender_core::secrets::{CredentialResolver, JsonSecretStore, SecretStore};
use start_defender_sdk::{ClientConfig, HttpTransport, DEFAULT_USER_AGENT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub stores: StoresConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    /// Conf sections (settings and accounts)
    #[serde(default = "default_conf_file")]
    pub conf_file: String,

    /// Credential entries
    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,
}

fn default_conf_file() -> String {
    "splunk_start_defender.toml".to_string()
}

fn default_secrets_file() -> String {
    "passwords.json".to_string()
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            conf_file: default_conf_file(),
            secrets_file: default_secrets_file(),
        }
    }
}

/// Outbound call settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub verify_tls: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            verify_tls: false,
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            user_agent: self.user_agent.clone(),
            verify_tls: self.verify_tls,
        }
    }
}

/// Inbound authentication. An empty token list leaves the API open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl ServerConfig {
    pub fn load(config_path: &Path, data_dir: PathBuf) -> Result<Self> {
        // Create data directory if it doesn't exist
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        // Load config file if it exists, otherwise use defaults
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self {
                data_dir: data_dir.clone(),
                stores: Default::default(),
                http: Default::default(),
                auth: Default::default(),
            }
        };

        config.data_dir = data_dir;

        Ok(config)
    }

    /// Get the conf file path
    pub fn conf_path(&self) -> PathBuf {
        self.data_dir.join(&self.stores.conf_file)
    }

    /// Get the secrets file path
    pub fn secrets_path(&self) -> PathBuf {
        self.data_dir.join(&self.stores.secrets_file)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: ScanGateway,
    pub log_control: LogControl,
    pub auth_tokens: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(config: &ServerConfig, log_control: LogControl) -> Self {
        let config_store = Arc::new(TomlConfigStore::new(config.conf_path()));
        let secret_store = Arc::new(JsonSecretStore::new(config.secrets_path()));
        let transport = Arc::new(HttpTransport::new(config.http.client_config()));

        Self::from_parts(
            config_store,
            secret_store,
            transport,
            log_control,
            config.auth.tokens.clone(),
        )
    }

    pub fn from_parts(
        config_store: Arc<dyn ConfigStore>,
        secret_store: Arc<dyn SecretStore>,
        transport: Arc<dyn ScanTransport>,
        log_control: LogControl,
        auth_tokens: Vec<String>,
    ) -> Self {
        let gateway = ScanGateway::new(
            ConfigResolver::new(config_store),
            CredentialResolver::new(secret_store),
            transport,
        );

        Self {
            gateway,
            log_control,
            auth_tokens: Arc::new(auth_tokens),
        }
    }

    pub fn config(&self) -> &ConfigResolver {
        self.gateway.config()
    }

    pub fn command(&self) -> StartDefenderCommand {
        StartDefenderCommand::new(self.gateway.clone())
    }
}
