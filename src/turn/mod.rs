//! Turn coordination
//!
//! A turn is one inbound message and the single outbound message answering
//! it. The coordinator gives each turn a fresh epoch, creates the
//! placeholder, drives inference into the renderer under the generation
//! timeout, and finalizes with suggestions or a failure notice. A newer
//! message in the same chat supersedes the running turn; the stale turn stops
//! reading its stream and never writes again.

mod conversation;

use std::sync::Arc;
use std::time::Duration;

use crate::channels::MessageSink;
use crate::inference::{GenerationRequest, InferenceClient, InferenceParams};
use crate::render::{PLACEHOLDER, RenderConfig, Renderer};
use crate::suggest::{CatalogItem, SuggestionMatcher, format_block};
use crate::{Error, Result};

pub use conversation::{Conversation, ConversationRegistry, Phase, TurnTicket};

/// Shown when no text could be produced at all
pub const FAILURE_NOTICE: &str = "\u{2026}something went wrong, try again sugar";

/// Shown when the generation ran past its time budget
pub const TIMEOUT_NOTICE: &str = "\u{2026}that took too long, try again sugar";

/// A user message routed to the coordinator
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    /// Message to reply to, if the platform supports threading
    pub message_id: Option<i64>,
    pub text: String,
}

/// How a turn ended
#[derive(Debug)]
pub enum TurnOutcome {
    /// Reply finalized, possibly with a suggestion block
    Completed {
        reply: String,
        suggested: Vec<CatalogItem>,
    },
    /// Reply finalized with a failure notice
    Failed { error: Error },
    /// A newer message took over; nothing more was written
    Superseded,
}

/// Knobs for the coordinator
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub params: InferenceParams,
    pub system_prompt: Option<String>,
    pub render: RenderConfig,
    /// Budget for connecting to the backend and streaming the reply
    pub generation_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            params: InferenceParams::default(),
            system_prompt: None,
            render: RenderConfig::default(),
            generation_timeout: Duration::from_secs(120),
        }
    }
}

/// Owns conversation state and runs turns
pub struct TurnCoordinator {
    client: InferenceClient,
    sink: Arc<dyn MessageSink>,
    matcher: SuggestionMatcher,
    conversations: Arc<ConversationRegistry>,
    settings: TurnSettings,
}

impl TurnCoordinator {
    #[must_use]
    pub fn new(
        client: InferenceClient,
        sink: Arc<dyn MessageSink>,
        matcher: SuggestionMatcher,
        settings: TurnSettings,
    ) -> Self {
        Self {
            client,
            sink,
            matcher,
            conversations: Arc::new(ConversationRegistry::default()),
            settings,
        }
    }

    /// Shared conversation registry (eviction, inspection)
    #[must_use]
    pub fn conversations(&self) -> &Arc<ConversationRegistry> {
        &self.conversations
    }

    #[must_use]
    pub const fn matcher(&self) -> &SuggestionMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn MessageSink> {
        &self.sink
    }

    /// Claim the next epoch for `chat_id`, superseding any live turn
    ///
    /// Call this in arrival order; the turn itself can then run on any task.
    #[must_use]
    pub fn begin(&self, chat_id: i64) -> TurnTicket {
        self.conversations.begin(chat_id)
    }

    /// Run one turn to its end
    pub async fn handle(&self, message: InboundMessage) -> TurnOutcome {
        let ticket = self.begin(message.chat_id);
        self.run(ticket, message).await
    }

    /// Run a turn whose epoch was claimed with [`Self::begin`]
    pub async fn run(&self, ticket: TurnTicket, message: InboundMessage) -> TurnOutcome {
        let chat_id = message.chat_id;

        if let Err(e) = self.sink.acknowledge(chat_id).await {
            tracing::warn!(chat_id, error = %e, "failed to acknowledge message");
        }

        if !ticket.is_current() {
            return TurnOutcome::Superseded;
        }

        let target = match self
            .sink
            .create(chat_id, PLACEHOLDER, message.message_id)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "failed to create placeholder");
                self.conversations.complete(&ticket);
                return TurnOutcome::Failed { error: e };
            }
        };
        self.conversations.attach(&ticket, target);

        let mut renderer = Renderer::new(
            Arc::clone(&self.sink),
            target,
            ticket.clone(),
            &self.settings.render,
        );

        let request = GenerationRequest {
            chat_id,
            epoch: ticket.epoch(),
            query: message.text.clone(),
            system_prompt: self.settings.system_prompt.clone(),
            params: self.settings.params.clone(),
        };

        let result = self.generate(&request, &mut renderer, ticket.clone()).await;

        match result {
            Ok(()) => self.complete(&ticket, &message, renderer).await,
            Err(Error::Superseded) => {
                tracing::debug!(chat_id, epoch = ticket.epoch(), "turn superseded");
                TurnOutcome::Superseded
            }
            Err(error) => self.fail(&ticket, renderer, error).await,
        }
    }

    /// Stream the reply into `renderer`, racing supersession and the timeout
    async fn generate(
        &self,
        request: &GenerationRequest,
        renderer: &mut Renderer,
        mut watcher: TurnTicket,
    ) -> Result<()> {
        let timeout = self.settings.generation_timeout;
        let work = async {
            let stream = self.client.stream(request).await?;
            tracing::debug!(
                chat_id = request.chat_id,
                epoch = request.epoch,
                protocol = stream.protocol().label(),
                "streaming reply"
            );
            renderer.consume(stream).await
        };

        tokio::select! {
            biased;
            () = watcher.superseded() => Err(Error::Superseded),
            result = tokio::time::timeout(timeout, work) => {
                result.unwrap_or(Err(Error::Timeout(timeout)))
            }
        }
    }

    async fn complete(
        &self,
        ticket: &TurnTicket,
        message: &InboundMessage,
        renderer: Renderer,
    ) -> TurnOutcome {
        let suggested = self
            .conversations
            .with_memory(ticket, |memory| {
                self.matcher.select(memory, &message.text, renderer.text())
            })
            .unwrap_or_default();

        if !suggested.is_empty() {
            tracing::debug!(
                chat_id = ticket.chat_id(),
                items = suggested.len(),
                "appending suggestions"
            );
        }

        match renderer.finish(&format_block(&suggested)).await {
            Ok(rendered) => {
                self.conversations.complete(ticket);
                tracing::info!(
                    chat_id = ticket.chat_id(),
                    epoch = ticket.epoch(),
                    chars = rendered.text.chars().count(),
                    "turn completed"
                );
                TurnOutcome::Completed {
                    reply: rendered.text,
                    suggested,
                }
            }
            Err(Error::Superseded) => TurnOutcome::Superseded,
            Err(error) => {
                self.conversations.complete(ticket);
                TurnOutcome::Failed { error }
            }
        }
    }

    async fn fail(&self, ticket: &TurnTicket, renderer: Renderer, error: Error) -> TurnOutcome {
        tracing::warn!(
            chat_id = ticket.chat_id(),
            epoch = ticket.epoch(),
            error = %error,
            "turn failed"
        );

        let notice = match &error {
            Error::Timeout(_) => TIMEOUT_NOTICE,
            _ => FAILURE_NOTICE,
        };

        match renderer.fail(notice).await {
            Ok(_) => {
                self.conversations.complete(ticket);
                TurnOutcome::Failed { error }
            }
            Err(Error::Superseded) => TurnOutcome::Superseded,
            Err(e) => {
                tracing::error!(chat_id = ticket.chat_id(), error = %e, "failed to show failure notice");
                self.conversations.complete(ticket);
                TurnOutcome::Failed { error }
            }
        }
    }
}

impl std::fmt::Debug for TurnCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnCoordinator")
            .field("backend", &self.client.base_url().as_str())
            .field("sink", &self.sink.name())
            .field("conversations", &self.conversations.len())
            .finish_non_exhaustive()
    }
}

/// Periodically drop idle conversations older than `ttl`
pub fn spawn_eviction(
    conversations: Arc<ConversationRegistry>,
    ttl: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = (ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let evicted = conversations.evict_idle(ttl);
            if evicted > 0 {
                tracing::debug!(evicted, remaining = conversations.len(), "evicted idle conversations");
            }
        }
    })
}
