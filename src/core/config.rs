use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::brain::AgentSettings;
use crate::core::store::RetryPolicy;

pub const CONFIG_FILE_NAME: &str = "moviebot.toml";
pub const CONFIG_ENV: &str = "MOVIEBOT_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_db_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Provider id from the embedded registry: "groq", "ollama" or "openai".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Falls back to the provider's default model.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Overrides the env var named by the registry entry.
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("movies.sqlite")
}
fn default_connect_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_db_timeout_secs() -> u64 {
    10
}
fn default_provider() -> String {
    "ollama".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> usize {
    2
}
fn default_max_rows() -> usize {
    200
}
fn default_preview_rows() -> usize {
    10
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            connect_retries: default_connect_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_db_timeout_secs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key_env: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_rows: default_max_rows(),
            preview_rows: default_preview_rows(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `--config` wins, then `MOVIEBOT_CONFIG`, then `./moviebot.toml`.
pub fn resolve_config_path(flag: Option<&str>) -> PathBuf {
    flag.map(PathBuf::from)
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Where a loaded configuration came from. Reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults(PathBuf),
}

impl ConfigSource {
    pub fn describe(&self) -> String {
        match self {
            ConfigSource::File(path) => format!("Loaded configuration from {}", path.display()),
            ConfigSource::Defaults(path) => format!(
                "No {} found, using default configuration.",
                path.display()
            ),
        }
    }
}

impl AppConfig {
    pub async fn load<P: AsRef<Path>>(config_path: P) -> Result<(Self, ConfigSource)> {
        let config_path = config_path.as_ref();
        let (mut config, source) = if config_path.exists() {
            let content = tokio::fs::read_to_string(config_path)
                .await
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config = Self::parse(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            (config, ConfigSource::File(config_path.to_path_buf()))
        } else {
            (Self::default(), ConfigSource::Defaults(config_path.to_path_buf()))
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok((config, source))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `MOVIEBOT_*` overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = lookup("MOVIEBOT_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(provider) = lookup("MOVIEBOT_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup("MOVIEBOT_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(url) = lookup("MOVIEBOT_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.database.connect_retries,
            backoff: Duration::from_millis(self.database.retry_backoff_ms),
        }
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            max_attempts: self.agent.max_attempts,
            max_rows: self.agent.max_rows,
            preview_rows: self.agent.preview_rows,
            model_timeout: Duration::from_secs(self.llm.timeout_secs),
            store_timeout: Duration::from_secs(self.database.timeout_secs),
            request_timeout: Duration::from_secs(self.agent.request_timeout_secs),
        }
    }
}
