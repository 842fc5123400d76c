//! Webhook endpoints for channel integrations

use std::sync::Arc;

use axum::{Router, routing::post};

use super::ApiState;

pub mod telegram;

/// Build webhooks router
///
/// Telegram posts to `/telegram/<bot token>`; the token segment keeps the
/// route unguessable even without a webhook secret.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/telegram/{token}", post(telegram::handle_update))
        .with_state(state)
}
