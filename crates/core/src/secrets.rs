use crate::error::{DefenderError, DefenderResult};
use crate::types::{TokenShape, CREDENTIAL_REALM};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, RwLock};

/// One entry of the secret store. Large secrets are split over several
/// entries sharing a name prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub realm: String,
    pub name: String,
    pub clear_password: String,
}

impl StoredCredential {
    pub fn new(
        realm: impl Into<String>,
        name: impl Into<String>,
        clear_password: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            name: name.into(),
            clear_password: clear_password.into(),
        }
    }
}

/// Credential storage keyed by `(realm, name)`
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Every entry of a realm, in store-iteration order.
    async fn list(&self, realm: &str) -> Result<Vec<StoredCredential>>;

    /// Clear-text value of one entry
    async fn get_secret(&self, realm: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .list(realm)
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.clear_password))
    }
}

/// Secret entries kept in a JSON array on disk. Array order is the
/// iteration order.
#[derive(Debug, Clone)]
pub struct JsonSecretStore {
    path: PathBuf,
}

impl JsonSecretStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl SecretStore for JsonSecretStore {
    async fn list(&self, realm: &str) -> Result<Vec<StoredCredential>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Secrets file not found, no entries");
            return Ok(Vec::new());
        }

        let content = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read secrets file {}", self.path.display()))?;
        let entries: Vec<StoredCredential> =
            serde_json::from_slice(&content).context("Failed to parse secrets file")?;

        Ok(entries.into_iter().filter(|c| c.realm == realm).collect())
    }
}

/// In-memory secret entries (tests and embedded use)
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    entries: Arc<RwLock<Vec<StoredCredential>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, credential: StoredCredential) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(credential);
    }
}

#[async_trait::async_trait]
impl SecretStore for MemorySecretStore {
    async fn list(&self, realm: &str) -> Result<Vec<StoredCredential>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().filter(|c| c.realm == realm).cloned().collect())
    }
}

static CIRC_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| token_pattern(TokenShape::CircToken));
static RELAY_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| token_pattern(TokenShape::RelayToken));

fn token_pattern(shape: TokenShape) -> Regex {
    // value is a JSON string body, so one fragment never swallows the next
    Regex::new(&format!(
        r#"\{{\s*"{}"\s*:\s*"((?:[^"\\]|\\.)*)"\s*\}}"#,
        shape.key()
    ))
    .expect("token pattern is valid")
}

/// Pull the token of the given shape out of a raw secret value.
///
/// The raw value may be several stored chunks glued together, so the
/// `{"<shape>": "<token>"}` object is searched anywhere in it. The first
/// fragment wins; an empty token counts as absent.
pub fn extract_token(raw: &str, shape: TokenShape) -> Option<String> {
    let re = match shape {
        TokenShape::CircToken => &*CIRC_TOKEN_RE,
        TokenShape::RelayToken => &*RELAY_TOKEN_RE,
    };

    let mut values = re.captures_iter(raw).filter_map(|c| c.get(1));
    let first = values.next()?.as_str();

    if values.any(|v| v.as_str() != first) {
        tracing::warn!(shape = %shape, "Secret holds several distinct tokens, using the first one");
    }

    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

/// Prefix every stored chunk of an account's secret starts with.
pub fn credential_name(account: &str) -> String {
    format!("{CREDENTIAL_REALM}:{account}``")
}

/// Turns an account name into a bearer token.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Concatenate the clear-text value of every chunk belonging to the
    /// account, in store order.
    pub async fn raw_secret(&self, account: &str) -> DefenderResult<String> {
        let prefix = credential_name(account);
        let chunks = self.store.list(CREDENTIAL_REALM).await?;

        let raw: String = chunks
            .iter()
            .filter(|c| c.realm == CREDENTIAL_REALM && c.name.starts_with(&prefix))
            .map(|c| c.clear_password.as_str())
            .collect();

        tracing::debug!(account, bytes = raw.len(), "Collected secret chunks");
        Ok(raw)
    }

    /// Token of the given shape, `None` when the secret holds none.
    pub async fn find_token(&self, account: &str, shape: TokenShape) -> DefenderResult<Option<String>> {
        let raw = self.raw_secret(account).await?;
        Ok(extract_token(&raw, shape))
    }

    /// Token of the given shape, failing with `TokenNotFound` when absent.
    pub async fn resolve_token(&self, account: &str, shape: TokenShape) -> DefenderResult<String> {
        self.find_token(account, shape)
            .await?
            .ok_or_else(|| DefenderError::TokenNotFound {
                account: account.to_string(),
                shape,
            })
    }
}
