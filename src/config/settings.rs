//! Configuration settings for Lektor.

use crate::agent::DEFAULT_MAX_ROUNDS;
use crate::error::{LektorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub session: SessionSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.lektor".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Answer-generation model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL of the Messages API.
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Tool-calling rounds allowed per query before a forced final answer.
    pub max_rounds: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub retry: RetrySettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 800,
            temperature: 0.0,
            max_rounds: DEFAULT_MAX_ROUNDS,
            timeout_secs: 60,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            retry: RetrySettings::default(),
        }
    }
}

/// Retry behaviour for failed model requests. Zero retries by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_secs: 30,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Vector store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
    /// Passages returned per search.
    pub max_results: usize,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.lektor/courses.db".to_string(),
            max_results: 5,
        }
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Question/answer exchanges kept per session.
    pub max_history: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { max_history: 2 }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LektorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lektor")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Set a scalar field by dotted key, e.g. `llm.max_rounds`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| LektorError::Config(format!("Invalid value for {}: {}", key, value)))
        }

        match key {
            "general.data_dir" => self.general.data_dir = value.to_string(),
            "general.log_level" => self.general.log_level = value.to_string(),
            "llm.base_url" => self.llm.base_url = value.to_string(),
            "llm.model" => self.llm.model = value.to_string(),
            "llm.max_tokens" => self.llm.max_tokens = parse(key, value)?,
            "llm.temperature" => self.llm.temperature = parse(key, value)?,
            "llm.max_rounds" => self.llm.max_rounds = parse(key, value)?,
            "llm.timeout_secs" => self.llm.timeout_secs = parse(key, value)?,
            "llm.api_key_env" => self.llm.api_key_env = value.to_string(),
            "llm.retry.max_retries" => self.llm.retry.max_retries = parse(key, value)?,
            "llm.retry.backoff_ms" => self.llm.retry.backoff_ms = parse(key, value)?,
            "embedding.model" => self.embedding.model = value.to_string(),
            "embedding.dimensions" => self.embedding.dimensions = parse(key, value)?,
            "vector_store.provider" => self.vector_store.provider = value.to_string(),
            "vector_store.sqlite_path" => self.vector_store.sqlite_path = value.to_string(),
            "vector_store.max_results" => self.vector_store.max_results = parse(key, value)?,
            "session.max_history" => self.session.max_history = parse(key, value)?,
            "server.host" => self.server.host = value.to_string(),
            "server.port" => self.server.port = parse(key, value)?,
            "prompts.custom_dir" => self.prompts.custom_dir = Some(value.to_string()),
            _ => return Err(LektorError::Config(format!("Unknown config key: {}", key))),
        }
        Ok(())
    }
}
