//! Layered configuration
//!
//! Built-in defaults, then an optional TOML file, then environment variables
//! prefixed `CODEATEASE__` with `__` between sections, e.g.
//! `CODEATEASE__GITHUB__CLIENT_ID`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "codeatease.toml";
pub const ENV_PREFIX: &str = "CODEATEASE";

const DEFAULT_SESSION_SECRET: &str = "change-me-in-production";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Public URL of this service, used for OAuth redirects
    pub base_url: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubSettings {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub oauth_base: String,
    pub timeout_secs: u64,
}

impl GithubSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// No token means chat answers come from the fallback template
    #[serde(default)]
    pub api_token: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub cold_start_delay_secs: u64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub github: GithubSettings,
    pub session: SessionSettings,
    pub llm: LlmSettings,
}

impl Settings {
    /// Load from defaults, the config file and `CODEATEASE__*` variables.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env(path, Self::environment(ENV_PREFIX))
    }

    fn environment(prefix: &str) -> Environment {
        Environment::with_prefix(prefix)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.base_url", "http://localhost:8000")?
            .set_default("server.log_level", "info")?
            .set_default("github.client_id", "")?
            .set_default("github.client_secret", "")?
            .set_default("github.api_base", "https://api.github.com")?
            .set_default("github.oauth_base", "https://github.com")?
            .set_default("github.timeout_secs", 30)?
            .set_default("session.secret", DEFAULT_SESSION_SECRET)?
            .set_default("session.ttl_minutes", 1440)?
            .set_default("llm.base_url", "https://router.huggingface.co/v1")?
            .set_default("llm.model", "Qwen/Qwen2.5-Coder-32B-Instruct")?
            .set_default("llm.timeout_secs", 90)?
            .set_default("llm.cold_start_delay_secs", 10)?
            .set_default("llm.max_tokens", 2000)?
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.session.ttl_minutes <= 0 {
            return Err(SettingsError::Invalid {
                key: "session.ttl_minutes",
                reason: "must be positive".to_string(),
            });
        }
        if self.session.secret.is_empty() {
            return Err(SettingsError::Invalid {
                key: "session.secret",
                reason: "must not be empty".to_string(),
            });
        }
        if self.session.secret == DEFAULT_SESSION_SECRET {
            warn!("session.secret is the built-in default; set CODEATEASE__SESSION__SECRET");
        }
        if self.github.client_id.is_empty() {
            warn!("github.client_id is not set; OAuth login will fail");
        }
        Ok(())
    }

    /// Token of the language model, if one is configured and non-empty
    pub fn llm_token(&self) -> Option<&str> {
        self.llm.api_token.as_deref().filter(|t| !t.is_empty())
    }
}
