use std::path::{Path, PathBuf};

use repomon_ai::ProviderConfig;
use serde::Deserialize;

/// Errors raised while loading or validating the daemon configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config: cannot read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Config: cannot parse '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Config: {reason}")]
    Invalid { reason: String },
}

/// Top-level daemon configuration. Every section and field has a default,
/// so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Environment variable the access token is read from. The token never
    /// appears in the file itself.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub include_open: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub api_url: Option<String>,
    /// Environment variable the API key is read from; defaults per
    /// provider (`OPENAI_API_KEY`, `DEEPSEEK_API_KEY`).
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Directory of prompt template overrides; built-in templates are used
    /// when unset.
    pub prompts_dir: Option<PathBuf>,
    #[serde(default = "default_subscriptions_file")]
    pub subscriptions_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Local wall-clock time of day the run fires, `HH:MM`.
    #[serde(default = "default_schedule_time")]
    pub time: String,
    #[serde(default = "default_frequency_days")]
    pub frequency_days: u64,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_marker_ttl_secs")]
    pub marker_ttl_secs: u64,
    #[serde(default)]
    pub enable_consolidated: bool,
    /// Length of the reporting window ending on the run day.
    #[serde(default = "default_window_days")]
    pub window_days: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_subscriptions_file() -> PathBuf {
    PathBuf::from("subscriptions.json")
}

fn default_schedule_time() -> String {
    "08:00".to_string()
}

fn default_frequency_days() -> u64 {
    1
}

fn default_tick_secs() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    4
}

fn default_marker_ttl_secs() -> u64 {
    600
}

fn default_window_days() -> u64 {
    1
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_github_token_env(),
            include_open: false,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_url: None,
            api_key_env: None,
            timeout_secs: None,
            max_tokens: None,
            temperature: None,
            retry_attempts: default_retry_attempts(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            reports_dir: default_reports_dir(),
            prompts_dir: None,
            subscriptions_file: default_subscriptions_file(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time: default_schedule_time(),
            frequency_days: default_frequency_days(),
            tick_secs: default_tick_secs(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            marker_ttl_secs: default_marker_ttl_secs(),
            enable_consolidated: false,
            window_days: default_window_days(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        crate::scheduler::parse_time(&self.schedule.time)?;
        if self.schedule.frequency_days == 0 {
            return Err(ConfigError::Invalid {
                reason: "schedule.frequency_days must be at least 1".to_string(),
            });
        }
        if self.run.window_days == 0 {
            return Err(ConfigError::Invalid {
                reason: "run.window_days must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Source API token, read from the configured environment variable.
    pub fn github_token(&self) -> Option<String> {
        std::env::var(&self.github.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    /// Backend selection handed to the gateway, with the API key resolved
    /// from the environment.
    pub fn provider_config(&self) -> ProviderConfig {
        let key_env = self
            .llm
            .api_key_env
            .clone()
            .or_else(|| default_key_env(&self.llm.provider).map(str::to_string));
        let api_key = key_env
            .and_then(|env| std::env::var(env).ok())
            .filter(|k| !k.is_empty());

        ProviderConfig {
            provider: self.llm.provider.clone(),
            model: self.llm.model.clone(),
            api_url: self.llm.api_url.clone(),
            api_key,
            timeout_secs: self.llm.timeout_secs,
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
        }
    }
}

fn default_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        _ => None,
    }
}
