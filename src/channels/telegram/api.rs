//! Raw Telegram Bot API calls

use reqwest::StatusCode;

use super::retry::{is_recoverable, parse_retry_after};
use super::types::{
    BotUser, EditMessageTextRequest, SendChatActionRequest, SendMessageRequest, SentMessage,
    SetWebhookRequest, TelegramResponse,
};
use crate::channels::EditOutcome;
use crate::{Error, Result};

/// Map a failed Bot API response to a sink error
fn api_error(method: &str, status: StatusCode, body: &str) -> Error {
    if is_recoverable(status.as_u16(), body) {
        Error::SinkTransient {
            message: format!("Telegram {method} error: {status} - {body}"),
            retry_after: parse_retry_after(body),
        }
    } else {
        Error::Channel(format!("Telegram {method} error: {status} - {body}"))
    }
}

/// Transport failures (connect, reset, timeout) are always worth a retry
fn transport_error(method: &str, e: &reqwest::Error) -> Error {
    Error::SinkTransient {
        message: format!("Telegram {method} error: {e}"),
        retry_after: None,
    }
}

impl super::TelegramChannel {
    /// Send a plain-text message and return its message ID
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or the response lacks a message ID
    pub async fn send_message_returning_id(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_to_message_id: reply_to,
            allow_sending_without_reply: reply_to.map(|_| true),
            disable_web_page_preview: Some(false),
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("sendMessage", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("sendMessage", &e))?;

        if !status.is_success() {
            let lower = body.to_lowercase();
            if lower.contains("chat not found") || lower.contains("bot was blocked by the user") {
                return Err(Error::Channel(format!(
                    "Telegram chat {chat_id} not reachable: {body}"
                )));
            }
            return Err(api_error("sendMessage", status, &body));
        }

        let parsed: TelegramResponse<SentMessage> = serde_json::from_str(&body)
            .map_err(|e| Error::Channel(format!("Telegram response parse error: {e}")))?;

        let message_id = parsed.result.map(|m| m.message_id).ok_or_else(|| {
            Error::Channel(format!(
                "Telegram sendMessage error: {}",
                parsed.description.unwrap_or_default()
            ))
        })?;

        tracing::debug!(chat_id, message_id, "Telegram message sent");
        Ok(message_id)
    }

    /// Replace the text of an existing message
    ///
    /// "message is not modified" is reported as [`EditOutcome::NotModified`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::SinkTransient` for retryable failures and
    /// `Error::Channel` otherwise
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<EditOutcome> {
        let request = EditMessageTextRequest {
            chat_id,
            message_id,
            text,
            disable_web_page_preview: Some(false),
        };

        let response = self
            .client
            .post(self.method_url("editMessageText"))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("editMessageText", &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(EditOutcome::Updated);
        }

        let body = response.text().await.unwrap_or_default();
        if body.to_lowercase().contains("message is not modified") {
            return Ok(EditOutcome::NotModified);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(chat_id, message_id, "Telegram edit rate limited");
        }

        Err(api_error("editMessageText", status, &body))
    }

    /// Send a chat action (typing indicator, etc.)
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()> {
        let request = SendChatActionRequest { chat_id, action };

        let response = self
            .client
            .post(self.method_url("sendChatAction"))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("sendChatAction", &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error("sendChatAction", status, &body));
        }

        Ok(())
    }

    /// Register the webhook URL, with the secret Telegram echoes back in
    /// `X-Telegram-Bot-Api-Secret-Token`
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        let request = SetWebhookRequest {
            url,
            allowed_updates: vec!["message"],
            secret_token,
            drop_pending_updates: true,
        };

        let response = self
            .client
            .post(self.method_url("setWebhook"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram setWebhook error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram setWebhook error: {status} - {body}"
            )));
        }

        tracing::info!("Telegram webhook set");
        Ok(())
    }

    /// Remove the webhook registration
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn delete_webhook(&self) -> Result<()> {
        let response = self
            .client
            .post(self.method_url("deleteWebhook"))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram deleteWebhook error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram deleteWebhook error: {status} - {body}"
            )));
        }

        tracing::info!("Telegram webhook deleted");
        Ok(())
    }

    /// Validate the bot token by calling `getMe`
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid
    pub async fn get_me(&self) -> Result<BotUser> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getMe error: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel("Invalid Telegram bot token".to_string()));
        }

        let parsed: TelegramResponse<BotUser> = response.json().await?;
        parsed
            .result
            .ok_or_else(|| Error::Channel("Telegram getMe returned no bot".to_string()))
    }
}
