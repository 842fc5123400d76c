//! Telegram webhook handler

mod process;
pub mod types;

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

pub use process::{Dispatch, Handled, dispatch, execute, process_message};

use self::types::TelegramUpdate;
use crate::api::ApiState;
use crate::turn::InboundMessage;
use crate::{Error, Result};

/// Header carrying the secret registered with `setWebhook`
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Telegram webhook response
#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

/// Check the secret header against the configured value, if any
///
/// # Errors
///
/// Returns `Error::Unauthorized` when a secret is configured and the header
/// is missing or different
pub fn verify_secret(expected: Option<&SecretString>, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if provided == Some(expected.expose_secret()) {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

fn respond(status: StatusCode, ok: bool) -> (StatusCode, Json<WebhookResponse>) {
    (status, Json(WebhookResponse { ok }))
}

/// Handle incoming Telegram update
///
/// Returns 200 immediately and processes the message in a background task.
/// Telegram requires fast webhook responses to avoid retries.
pub async fn handle_update(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    if token != state.bot_token.expose_secret() {
        return respond(StatusCode::NOT_FOUND, false);
    }

    if let Err(e) = verify_secret(state.webhook_secret.as_ref(), &headers) {
        tracing::warn!(error = %e, "Telegram webhook secret mismatch");
        return respond(StatusCode::UNAUTHORIZED, false);
    }

    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "malformed Telegram update");
            return respond(StatusCode::BAD_REQUEST, false);
        }
    };

    tracing::debug!(update_id = update.update_id, "received Telegram update");

    // Dedup check: Telegram re-delivers updates it thinks we missed
    {
        let mut dedup = state
            .dedup
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if dedup.is_duplicate(update.update_id) {
            tracing::debug!(update_id = update.update_id, "duplicate Telegram update, skipping");
            return respond(StatusCode::OK, true);
        }
    }

    let Some(message) = update.message else {
        tracing::debug!(update_id = update.update_id, "ignoring non-message update");
        return respond(StatusCode::OK, true);
    };

    if message.from.as_ref().is_some_and(|u| u.is_bot) {
        return respond(StatusCode::OK, true);
    }

    let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
        tracing::debug!(chat_id = message.chat.id, "ignoring message without text");
        return respond(StatusCode::OK, true);
    };

    let inbound = InboundMessage {
        chat_id: message.chat.id,
        message_id: Some(message.message_id),
        text,
    };

    // Claim the epoch before spawning so turns follow arrival order
    let route = dispatch(&state, &inbound);
    tokio::spawn(async move {
        execute(&state, inbound, route).await;
    });

    respond(StatusCode::OK, true)
}
