use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "http://weaviate:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DB_HOST: &str = "db";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_USER: &str = "postgres";
const DEFAULT_DB_PASSWORD: &str = "difyai123456";
const DEFAULT_DB_NAME: &str = "dify";
const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PAUSE_BETWEEN_MS: u64 = 500;
const DEFAULT_JOURNAL_PATH: &str = "schemafix-journal.db";
const REDACTED: &str = "********";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub metadata_store: MetadataStoreConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl VectorStoreConfig {
    /// Bearer credential for the store, or `None` when auth is disabled.
    ///
    /// A direct `api_key` wins over `api_key_env`; an empty key means no auth.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Ok(Some(key.clone()));
            }
        }
        match &self.api_key_env {
            Some(var_name) => std::env::var(var_name)
                .map(|key| Some(key).filter(|k| !k.is_empty()))
                .map_err(|_| {
                    ConfigError::Invalid(format!(
                        "environment variable '{var_name}' is not set (required by api_key_env)"
                    ))
                }),
            None => Ok(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MetadataStoreConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "default_db_password")]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub database: String,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for MetadataStoreConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: default_db_password(),
            database: default_db_name(),
            connect_timeout_secs: default_db_connect_timeout_secs(),
        }
    }
}

impl MetadataStoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_db_host() -> String {
    DEFAULT_DB_HOST.to_string()
}

fn default_db_port() -> u16 {
    DEFAULT_DB_PORT
}

fn default_db_user() -> String {
    DEFAULT_DB_USER.to_string()
}

fn default_db_password() -> String {
    DEFAULT_DB_PASSWORD.to_string()
}

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

fn default_db_connect_timeout_secs() -> u64 {
    DEFAULT_DB_CONNECT_TIMEOUT_SECS
}

/// Which collections the engine is allowed to look at.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct ScopeConfig {
    /// Also consider collections that do not follow the host application's
    /// `Vector_index_<uuid>_Node` naming convention.
    #[serde(default)]
    pub include_unmanaged: bool,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ExecutorConfig {
    #[serde(default = "default_pause_between_ms")]
    pub pause_between_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pause_between_ms: default_pause_between_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn pause_between(&self) -> Duration {
        Duration::from_millis(self.pause_between_ms)
    }
}

fn default_pause_between_ms() -> u64 {
    DEFAULT_PAUSE_BETWEEN_MS
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct JournalConfig {
    #[serde(default = "default_journal_path")]
    pub path: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
        }
    }
}

fn default_journal_path() -> String {
    DEFAULT_JOURNAL_PATH.to_string()
}

impl Config {
    /// Load the config file if it exists, apply environment overrides and
    /// validate. A missing file is not an error: defaults plus environment
    /// are a complete configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            log::debug!("config file '{}' not found, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment overrides. `lookup` returns the value of a variable,
    /// if set. Host-application variable names take precedence over the
    /// generic `DB_*` names it also exports.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        if let Some(endpoint) = first(&["WEAVIATE_ENDPOINT"]) {
            self.vector_store.endpoint = endpoint;
        }
        if let Some(key) = first(&["WEAVIATE_API_KEY"]) {
            self.vector_store.api_key = Some(key);
        }

        let db = &mut self.metadata_store;
        if let Some(host) = first(&["DIFY_DB_HOST", "DB_HOST"]) {
            db.host = host;
        }
        if let Some(port) = first(&["DIFY_DB_PORT", "DB_PORT"]) {
            db.port = port.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("database port '{port}' is not a valid port number"))
            })?;
        }
        if let Some(user) = first(&["DIFY_DB_USER", "DB_USERNAME"]) {
            db.user = user;
        }
        if let Some(password) = first(&["DIFY_DB_PASSWORD", "DB_PASSWORD"]) {
            db.password = password;
        }
        if let Some(database) = first(&["DIFY_DB_NAME", "DB_DATABASE"]) {
            db.database = database;
        }
        Ok(())
    }

    /// Check that every value needed to reach both stores is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.vector_store.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid(
                "vector_store.endpoint must not be empty".to_string(),
            ));
        }
        let parsed = url::Url::parse(endpoint).map_err(|e| {
            ConfigError::Invalid(format!("vector_store.endpoint '{endpoint}' is not a URL: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "vector_store.endpoint must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.vector_store.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "vector_store.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let db = &self.metadata_store;
        for (field, value) in [
            ("metadata_store.host", &db.host),
            ("metadata_store.user", &db.user),
            ("metadata_store.database", &db.database),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if db.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "metadata_store.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.journal.path.trim().is_empty() {
            return Err(ConfigError::Invalid("journal.path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn auth_enabled(&self) -> bool {
        matches!(self.vector_store.resolve_api_key(), Ok(Some(_)))
    }

    /// The effective configuration as TOML, with credentials masked.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.vector_store.api_key.is_some() {
            shown.vector_store.api_key = Some(REDACTED.to_string());
        }
        shown.metadata_store.password = REDACTED.to_string();
        toml::to_string_pretty(&shown).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
