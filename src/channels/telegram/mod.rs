//! Telegram Bot API sink
//!
//! Receives updates through the webhook in [`crate::api`]; this module only
//! covers the outbound calls.

mod api;
pub mod dedup;
pub mod retry;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

pub use dedup::UpdateDedup;
pub use retry::RetryPolicy;

use super::{EditOutcome, MessageHandle, MessageSink};
use crate::Result;

/// Default Bot API host
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram sink backed by the Bot API
#[derive(Clone)]
pub struct TelegramChannel {
    token: Arc<SecretString>,
    client: Client,
    api_base: String,
}

impl TelegramChannel {
    /// Create a sink for the bot identified by `token`
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Create a sink against a non-default Bot API host (local Bot API server, tests)
    #[must_use]
    pub fn with_api_base(token: SecretString, api_base: &str) -> Self {
        Self {
            token: Arc::new(token),
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Full URL for a Bot API method
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token.expose_secret())
    }
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageSink for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn create(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<MessageHandle> {
        let message_id = self.send_message_returning_id(chat_id, text, reply_to).await?;
        Ok(MessageHandle {
            chat_id,
            message_id,
        })
    }

    async fn update(&self, handle: MessageHandle, text: &str) -> Result<EditOutcome> {
        self.edit_message_text(handle.chat_id, handle.message_id, text)
            .await
    }

    async fn send(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()> {
        self.send_message_returning_id(chat_id, text, reply_to)
            .await
            .map(|_| ())
    }

    async fn acknowledge(&self, chat_id: i64) -> Result<()> {
        self.send_chat_action(chat_id, "typing").await?;
        tracing::debug!(chat_id, "Telegram typing indicator sent");
        Ok(())
    }
}
