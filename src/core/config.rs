//! Configuration management for the chat gateway.
//!
//! Settings are layered with the `config` crate: built-in defaults, then
//! `config.yaml` and `config.local.yaml` (with `${VAR}` expansion), then
//! `GATEWAY_`-prefixed environment variables, then the well-known
//! `OPENAI_*` variables.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Config files read from the config directory, lowest precedence first.
const CONFIG_FILES: &[&str] = &["config.yaml", "config.local.yaml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub openai: OpenAiConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub health: HealthConfig,
    pub title: TitleConfig,
    pub models: Vec<ModelConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            openai: OpenAiConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            health: HealthConfig::default(),
            title: TitleConfig::default(),
            models: default_models(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Wall-clock limit for one chat stream.
    pub timeout_seconds: u64,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: 300,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    pub headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: vec!["http://localhost:5173".to_string()],
            methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-API-Key".to_string(),
                "X-Request-ID".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    None,
    ApiKey,
    Jwt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub organization: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Total attempts per provider call, including the first.
    pub max_retries: u32,
    pub default_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            organization: None,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_seconds: 60,
            max_retries: 3,
            default_model: "gpt-4o".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 16000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub openai_check_enabled: bool,
    pub timeout_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            openai_check_enabled: true,
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub max_length: usize,
    pub timeout_ms: u64,
    pub model: String,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            max_length: 50,
            timeout_ms: 10000,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// One entry of the model roster shown to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name sent to the provider.
    pub openai_model: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_supports_tools")]
    pub supports_tools: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_context_window() -> u32 {
    128000
}

fn default_supports_tools() -> bool {
    true
}

fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig {
            id: "openai/gpt-4o".to_string(),
            name: "GPT-4o".to_string(),
            provider: default_provider(),
            openai_model: "gpt-4o".to_string(),
            description: Some("Most capable OpenAI model".to_string()),
            context_window: default_context_window(),
            supports_tools: true,
        },
        ModelConfig {
            id: "openai/gpt-4o-mini".to_string(),
            name: "GPT-4o Mini".to_string(),
            provider: default_provider(),
            openai_model: "gpt-4o-mini".to_string(),
            description: Some("Fast and affordable".to_string()),
            context_window: default_context_window(),
            supports_tools: true,
        },
    ]
}

impl AppConfig {
    /// Load from the directory named by `GATEWAY_CONFIG_DIR` (default `.`).
    pub fn load() -> Result<Self> {
        let dir = std::env::var("GATEWAY_CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
        Self::load_from_dir(Path::new(&dir))
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        for name in CONFIG_FILES {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let expanded = expand_env_vars(&content)?;
            builder = builder.add_source(File::from_str(&expanded, FileFormat::Yaml));
        }

        builder = builder.add_source(
            Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.apply_env_overrides();
        if config.models.is_empty() {
            config.models = default_models();
        }
        Ok(config)
    }

    /// Well-known provider variables take precedence over every other source.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.openai.api_key = key;
            }
        }
        if let Ok(base_url) = std::env::var("OPENAI_API_BASE_URL") {
            if !base_url.is_empty() {
                self.openai.base_url = base_url;
            }
        }
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.trim().is_empty() {
            bail!("openai.api_key is required (set OPENAI_API_KEY)");
        }
        match self.auth.mode {
            AuthMode::ApiKey if self.auth.api_keys.is_empty() => {
                bail!("auth.mode is api_key but no auth.api_keys are configured")
            }
            AuthMode::Jwt => bail!("auth.mode jwt is not supported; use none or api_key"),
            _ => {}
        }
        if !(10..=200).contains(&self.title.max_length) {
            bail!(
                "title.max_length must be between 10 and 200, got {}",
                self.title.max_length
            );
        }
        if !(1000..=30000).contains(&self.title.timeout_ms) {
            bail!(
                "title.timeout_ms must be between 1000 and 30000, got {}",
                self.title.timeout_ms
            );
        }
        if self.server.timeout_seconds == 0 {
            bail!("server.timeout_seconds must be greater than zero");
        }
        Ok(())
    }

    pub fn find_model(&self, id: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Map a UI model id onto the provider's model name.
    ///
    /// Roster ids win; otherwise a `provider/` prefix is stripped.
    pub fn resolve_model(&self, requested: &str) -> String {
        if let Some(model) = self.find_model(requested) {
            return model.openai_model.clone();
        }
        match requested.split_once('/') {
            Some((_, name)) => name.to_string(),
            None => requested.to_string(),
        }
    }
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::?-([^}]*))?\}")?;

    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .to_string())
}
