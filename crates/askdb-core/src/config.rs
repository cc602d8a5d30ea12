use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AskError, Result};

/// Top-level configuration for askdb.
///
/// Loaded from `~/.askdb/config.toml` by default. Every section and field
/// has a default so a partial (or missing) file is always usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl AskConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AskConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AskError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Display name reported by the health endpoint.
    pub app_name: String,
    /// Data directory holding the application database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "askdb".to_string(),
            data_dir: "~/.askdb/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

/// Execution sandbox settings for the analytical database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Path to the read-only analytical SQLite database.
    pub database_path: String,
    /// Maximum rows returned by one query. Excess rows are dropped.
    pub max_rows: usize,
    /// Wall-clock limit for one query, in seconds.
    pub timeout_secs: u64,
    /// Sample rows per table included in the schema text.
    pub sample_rows: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            database_path: "~/.askdb/data/sample.db".to_string(),
            max_rows: 500,
            timeout_secs: 10,
            sample_rows: 3,
        }
    }
}

/// Conversational memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of question/SQL/answer triples kept per conversation.
    pub window: usize,
    /// Answer characters kept per entry when rendering the transcript.
    pub answer_preview_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: 10,
            answer_preview_chars: 200,
        }
    }
}

/// Chat turn settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum question length in characters.
    pub max_message_chars: usize,
    /// Title assigned to newly created conversations.
    pub default_title: String,
    /// Characters of the first question used as the auto-assigned title.
    pub title_chars: usize,
    /// Capacity of the per-turn event channel.
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 2000,
            default_title: "New conversation".to_string(),
            title_chars: 30,
            event_buffer: 32,
        }
    }
}

/// Language-model provider settings (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// API key. May also be supplied through `ASKDB_LLM_API_KEY`.
    pub api_key: String,
    /// Model used for SQL generation, explanations and charts.
    pub model: String,
    /// Per-request transport timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Drop one leading space from each streamed delta. Some providers prefix
    /// every chunk with a space.
    pub strip_delta_leading_space: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 120,
            strip_delta_leading_space: true,
        }
    }
}
