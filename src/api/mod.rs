//! HTTP surface: Telegram webhook ingress and health checks

pub mod health;
pub mod webhooks;

use std::sync::{Arc, Mutex};

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::channels::UpdateDedup;
use crate::turn::TurnCoordinator;

/// Shared state for request handlers
pub struct ApiState {
    pub coordinator: Arc<TurnCoordinator>,
    /// Bot token, matched against the webhook path segment
    pub bot_token: SecretString,
    /// Expected secret header; `None` disables the check
    pub webhook_secret: Option<SecretString>,
    /// Reply to off-topic messages with a nudge instead of generating
    pub topic_gate: bool,
    pub dedup: Mutex<UpdateDedup>,
}

impl ApiState {
    #[must_use]
    pub fn new(
        coordinator: Arc<TurnCoordinator>,
        bot_token: SecretString,
        webhook_secret: Option<SecretString>,
    ) -> Self {
        Self {
            coordinator,
            bot_token,
            webhook_secret,
            topic_gate: false,
            dedup: Mutex::new(UpdateDedup::default()),
        }
    }

    #[must_use]
    pub const fn with_topic_gate(mut self, enabled: bool) -> Self {
        self.topic_gate = enabled;
        self
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("coordinator", &self.coordinator)
            .field("webhook_secret", &self.webhook_secret.is_some())
            .field("topic_gate", &self.topic_gate)
            .finish_non_exhaustive()
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(webhooks::router(state))
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
}

/// API server
#[derive(Debug)]
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not set, webhook requests are not authenticated");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "webhook server listening");

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
