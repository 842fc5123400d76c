//! TOML configuration file loading
//!
//! Supports `~/.config/honey/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HoneyConfigFile {
    #[serde(default)]
    pub telegram: TelegramFileConfig,

    /// Inference backend
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Streaming edit throttle
    #[serde(default)]
    pub render: RenderFileConfig,

    /// Suggestion catalog and cooldown
    #[serde(default)]
    pub suggest: SuggestFileConfig,

    /// Webhook server
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Telegram bot configuration
#[derive(Debug, Default, Deserialize)]
pub struct TelegramFileConfig {
    pub token: Option<String>,
    pub webhook_secret: Option<String>,
    /// Bot API host override (local Bot API server)
    pub api_base: Option<String>,
}

/// Inference backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Base URL (e.g. "http://127.0.0.1:11434")
    pub url: Option<String>,
    pub model: Option<String>,
    pub num_predict: Option<u32>,
    pub num_ctx: Option<u32>,
    pub keep_alive: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub repeat_penalty: Option<f32>,
    pub system_prompt: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

/// Renderer configuration
#[derive(Debug, Default, Deserialize)]
pub struct RenderFileConfig {
    pub interval_ms: Option<u64>,
    pub min_delta: Option<usize>,
    pub max_total_chars: Option<usize>,
}

/// Suggestion configuration
#[derive(Debug, Default, Deserialize)]
pub struct SuggestFileConfig {
    pub cooldown_secs: Option<u64>,
    pub max_items: Option<usize>,
    pub catalog_path: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    pub generation_timeout_secs: Option<u64>,
    pub conversation_ttl_secs: Option<u64>,
    pub topic_gate: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HoneyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HoneyConfigFile {
    let Some(path) = config_file_path() else {
        return HoneyConfigFile::default();
    };

    if !path.exists() {
        return HoneyConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HoneyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HoneyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/honey/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("honey").join("config.toml"))
}
