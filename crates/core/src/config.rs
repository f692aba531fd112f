use crate::error::{DefenderError, DefenderResult};
use crate::types::{Account, InstanceRole, LogLevel, LoggingSettings, Settings, ACCOUNT_CONF, SETTINGS_CONF};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// A named stanza of a conf section and its key/value content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stanza {
    pub name: String,
    pub content: BTreeMap<String, String>,
}

impl Stanza {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.content.get(key).map(String::as_str)
    }
}

/// Stanza-oriented key/value configuration storage
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Every stanza of a conf section. An unknown section yields no stanzas.
    async fn stanzas(&self, conf: &str) -> Result<Vec<Stanza>>;
}

/// Conf sections kept in a TOML file, one table per section and one
/// sub-table per stanza. The file is re-read on every call so edits are
/// picked up by the next request.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parse(content: &str, conf: &str) -> Result<Vec<Stanza>> {
        let doc: toml::Table = toml::from_str(content).context("Failed to parse conf file")?;

        let Some(section) = doc.get(conf) else {
            return Ok(Vec::new());
        };
        let section = section
            .as_table()
            .with_context(|| format!("Conf section {conf} is not a table"))?;

        let mut stanzas = Vec::with_capacity(section.len());
        for (name, body) in section {
            let body = body
                .as_table()
                .with_context(|| format!("Stanza {conf}/{name} is not a table"))?;

            let mut stanza = Stanza::new(name.clone());
            for (key, value) in body {
                // conf values are strings; accept bare TOML scalars as well
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                stanza.content.insert(key.clone(), value);
            }
            stanzas.push(stanza);
        }

        Ok(stanzas)
    }
}

#[async_trait::async_trait]
impl ConfigStore for TomlConfigStore {
    async fn stanzas(&self, conf: &str) -> Result<Vec<Stanza>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Conf file not found, no stanzas");
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read conf file {}", self.path.display()))?;

        Self::parse(&content, conf)
    }
}

/// In-memory conf sections (tests and embedded use)
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    sections: Arc<RwLock<BTreeMap<String, Vec<Stanza>>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a stanza in a section.
    pub fn put(&self, conf: &str, stanza: Stanza) {
        let mut sections = self.sections.write().unwrap_or_else(|e| e.into_inner());
        let section = sections.entry(conf.to_string()).or_default();
        match section.iter_mut().find(|s| s.name == stanza.name) {
            Some(existing) => *existing = stanza,
            None => section.push(stanza),
        }
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn stanzas(&self, conf: &str) -> Result<Vec<Stanza>> {
        let sections = self.sections.read().unwrap_or_else(|e| e.into_inner());
        Ok(sections.get(conf).cloned().unwrap_or_default())
    }
}

/// Reads the instance role, logging settings and account connection details.
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn ConfigStore>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Read the settings section.
    ///
    /// A missing or unknown `instance_role` is reported as `role: None`; the
    /// gateway refuses to act on it. A missing or unknown `loglevel` falls
    /// back to INFO.
    pub async fn get_conf(&self) -> DefenderResult<Settings> {
        let stanzas = self.store.stanzas(SETTINGS_CONF).await?;

        let mut role = None;
        let mut loglevel = LogLevel::default();

        for stanza in &stanzas {
            match stanza.name.as_str() {
                "role" => {
                    if let Some(value) = stanza.get("instance_role") {
                        match value.parse::<InstanceRole>() {
                            Ok(parsed) => role = Some(parsed),
                            Err(e) => tracing::warn!("Ignoring instance_role: {}", e),
                        }
                    }
                }
                "logging" => {
                    if let Some(value) = stanza.get("loglevel") {
                        loglevel = LogLevel::parse(value).unwrap_or_else(|| {
                            tracing::warn!(loglevel = value, "Unknown loglevel, using INFO");
                            LogLevel::Info
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(Settings {
            role,
            logging: LoggingSettings { loglevel },
        })
    }

    /// Every stanza of the settings section as `{stanza: {key: value}}`.
    pub async fn get_conf_raw(&self) -> DefenderResult<BTreeMap<String, BTreeMap<String, String>>> {
        let stanzas = self.store.stanzas(SETTINGS_CONF).await?;
        Ok(stanzas.into_iter().map(|s| (s.name, s.content)).collect())
    }

    /// Look up one account stanza.
    pub async fn get_account(&self, name: &str) -> DefenderResult<Account> {
        let stanzas = self.store.stanzas(ACCOUNT_CONF).await?;

        if stanzas.is_empty() {
            return Err(DefenderError::NoAccountsConfigured {
                account: name.to_string(),
            });
        }

        let stanza = stanzas
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DefenderError::ConfigNotFound {
                account: name.to_string(),
            })?;

        let url = |key: &str| {
            stanza
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(Account {
            name: name.to_string(),
            circ_url: url("circ_url"),
            relay_url: url("relay_url"),
        })
    }
}
