//! Configuration management for the Honey relay
//!
//! Precedence is environment variable, then the TOML file, then the built-in
//! default.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::channels::telegram::{DEFAULT_API_BASE, RetryPolicy};
use crate::inference::InferenceParams;
use crate::render::{DEFAULT_MAX_CHARS, DEFAULT_MIN_DELTA, DEFAULT_MIN_INTERVAL_MS, RenderConfig};
use crate::suggest::MAX_SUGGESTIONS;
use crate::turn::TurnSettings;
use crate::{Error, Result};

use file::HoneyConfigFile;

/// Default inference backend
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:11434";

/// Default webhook listen port
pub const DEFAULT_PORT: u16 = 8000;

/// System prompt that keeps replies short enough for a chat bubble
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, concise assistant replying for a Telegram bot. \
Keep answers under ~180 words (about 900 characters) unless the user asks for details. \
Prefer short bullets for steps; avoid long stories.";

/// Honey relay configuration
#[derive(Debug)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub backend: BackendConfig,
    pub render: RenderConfig,
    pub suggest: SuggestConfig,
    pub server: ServerConfig,
}

/// Telegram bot settings
#[derive(Debug)]
pub struct TelegramConfig {
    /// Bot token; also the secret path segment of the webhook route
    pub token: SecretString,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`; `None` disables the check
    pub webhook_secret: Option<SecretString>,
    pub api_base: String,
}

/// Inference backend settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub params: InferenceParams,
    pub system_prompt: Option<String>,
}

/// Suggestion settings
#[derive(Debug, Clone)]
pub struct SuggestConfig {
    pub cooldown: Duration,
    /// Items per reply, within `1..=3`
    pub max_items: usize,
    /// Catalog file; the embedded catalog when `None`
    pub catalog_path: Option<PathBuf>,
}

/// Webhook server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub generation_timeout: Duration,
    /// Idle conversations older than this are evicted
    pub conversation_ttl: Duration,
    /// Nudge off-topic messages instead of answering them
    pub topic_gate: bool,
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if the bot token is missing or a value is malformed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(|key| std::env::var(key).ok(), fc)
    }

    /// Build configuration from an environment lookup and a parsed file
    ///
    /// # Errors
    ///
    /// Returns error if the bot token is missing or a value is malformed
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        fc: HoneyConfigFile,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Telegram (env > toml)
        let token = env("TELEGRAM_BOT_TOKEN")
            .or(fc.telegram.token)
            .ok_or_else(|| Error::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))?;
        let webhook_secret = env("WEBHOOK_SECRET").or(fc.telegram.webhook_secret);
        let telegram = TelegramConfig {
            token: SecretString::from(token),
            webhook_secret: webhook_secret.map(SecretString::from),
            api_base: env("TELEGRAM_API_BASE")
                .or(fc.telegram.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        };

        // Backend (env > toml > default)
        let b = fc.backend;
        let raw_url = env("OLLAMA_URL")
            .or(b.url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let base_url = Url::parse(&raw_url)
            .map_err(|e| Error::Config(format!("invalid backend url {raw_url:?}: {e}")))?;

        let defaults = InferenceParams::default();
        let params = InferenceParams {
            model: env("OLLAMA_MODEL").or(b.model).unwrap_or(defaults.model),
            num_predict: parsed(&env, "NUM_PREDICT")?
                .or(b.num_predict)
                .unwrap_or(defaults.num_predict),
            num_ctx: parsed(&env, "NUM_CTX")?
                .or(b.num_ctx)
                .unwrap_or(defaults.num_ctx),
            keep_alive: env("KEEP_ALIVE")
                .or(b.keep_alive)
                .unwrap_or(defaults.keep_alive),
            temperature: parsed(&env, "TEMP")?
                .or(b.temperature)
                .unwrap_or(defaults.temperature),
            top_p: parsed(&env, "TOP_P")?.or(b.top_p).unwrap_or(defaults.top_p),
            repeat_penalty: parsed(&env, "REPEAT_PENALTY")?
                .or(b.repeat_penalty)
                .unwrap_or(defaults.repeat_penalty),
        };

        let backend = BackendConfig {
            base_url,
            connect_timeout: Duration::from_secs(
                parsed(&env, "HONEY_CONNECT_TIMEOUT_SECS")?
                    .or(b.connect_timeout_secs)
                    .unwrap_or(5),
            ),
            params,
            system_prompt: Some(
                env("HONEY_SYSTEM_PROMPT")
                    .or(b.system_prompt)
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
        };

        // Renderer (env > toml > default)
        let render = RenderConfig {
            min_interval: Duration::from_millis(
                parsed(&env, "HONEY_RENDER_INTERVAL_MS")?
                    .or(fc.render.interval_ms)
                    .unwrap_or(DEFAULT_MIN_INTERVAL_MS),
            ),
            min_delta: parsed(&env, "HONEY_RENDER_MIN_DELTA")?
                .or(fc.render.min_delta)
                .unwrap_or(DEFAULT_MIN_DELTA),
            max_chars: parsed(&env, "MAX_TOTAL_CHARS")?
                .or(fc.render.max_total_chars)
                .unwrap_or(DEFAULT_MAX_CHARS),
            retry: RetryPolicy::default(),
            ..RenderConfig::default()
        };

        // Suggestions (env > toml > default)
        let suggest = SuggestConfig {
            cooldown: Duration::from_secs(
                parsed(&env, "HONEY_SUGGEST_COOLDOWN_SECS")?
                    .or(fc.suggest.cooldown_secs)
                    .unwrap_or(1800),
            ),
            max_items: parsed(&env, "HONEY_SUGGEST_MAX")?
                .or(fc.suggest.max_items)
                .unwrap_or(MAX_SUGGESTIONS)
                .clamp(1, MAX_SUGGESTIONS),
            catalog_path: env("HONEY_CATALOG_PATH")
                .or(fc.suggest.catalog_path)
                .map(PathBuf::from),
        };

        // Server (env > toml > default)
        let port = match parsed(&env, "HONEY_PORT")? {
            Some(port) => Some(port),
            None => parsed(&env, "PORT")?,
        };
        let server = ServerConfig {
            port: port.or(fc.server.port).unwrap_or(DEFAULT_PORT),
            generation_timeout: Duration::from_secs(
                parsed(&env, "HONEY_GENERATION_TIMEOUT_SECS")?
                    .or(fc.server.generation_timeout_secs)
                    .unwrap_or(120),
            ),
            conversation_ttl: Duration::from_secs(
                parsed(&env, "HONEY_CONVERSATION_TTL_SECS")?
                    .or(fc.server.conversation_ttl_secs)
                    .unwrap_or(3600),
            ),
            topic_gate: env("HONEY_TOPIC_GATE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.server.topic_gate)
                .unwrap_or(false),
        };

        Ok(Self {
            telegram,
            backend,
            render,
            suggest,
            server,
        })
    }

    /// Settings handed to the turn coordinator
    #[must_use]
    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            params: self.backend.params.clone(),
            system_prompt: self.backend.system_prompt.clone(),
            render: self.render.clone(),
            generation_timeout: self.server.generation_timeout,
        }
    }
}

/// Parse an optional environment value, rejecting malformed input
fn parsed<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key} value {raw:?}: {e}")))
        })
        .transpose()
}
