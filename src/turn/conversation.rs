//! Per-conversation state and the epoch tickets handed to generations

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::channels::MessageHandle;
use crate::suggest::SuggestionMemory;

/// Lifecycle phase of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
}

/// Ephemeral state of one chat
#[derive(Debug)]
pub struct Conversation {
    epoch: watch::Sender<u64>,
    phase: Phase,
    target: Option<MessageHandle>,
    memory: SuggestionMemory,
    last_active: Instant,
}

impl Conversation {
    fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            epoch,
            phase: Phase::Idle,
            target: None,
            memory: SuggestionMemory::default(),
            last_active: Instant::now(),
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Message the live generation is rendering into
    #[must_use]
    pub const fn target(&self) -> Option<MessageHandle> {
        self.target
    }
}

/// Proof that a generation was started at a given epoch
///
/// Clones observe the same conversation. Once a newer generation begins,
/// every ticket of the older epoch reports itself stale.
#[derive(Debug, Clone)]
pub struct TurnTicket {
    chat_id: i64,
    epoch: u64,
    current: watch::Receiver<u64>,
}

impl TurnTicket {
    #[must_use]
    pub const fn chat_id(&self) -> i64 {
        self.chat_id
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether this ticket's epoch is still the conversation's epoch
    #[must_use]
    pub fn is_current(&self) -> bool {
        *self.current.borrow() == self.epoch
    }

    /// Resolves once a newer generation has begun
    ///
    /// Never resolves if the conversation is dropped while this ticket is
    /// still current.
    pub async fn superseded(&mut self) {
        loop {
            if *self.current.borrow_and_update() != self.epoch {
                return;
            }
            if self.current.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Map of chat id to conversation, with one lock per conversation
///
/// The outer lock is held only to look up or insert an entry, so turns in
/// different chats never wait on each other.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    conversations: Mutex<HashMap<i64, Arc<Mutex<Conversation>>>>,
}

impl ConversationRegistry {
    fn entry(&self, chat_id: i64) -> Arc<Mutex<Conversation>> {
        let mut map = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(Conversation::new()))),
        )
    }

    fn get(&self, chat_id: i64) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat_id)
            .cloned()
    }

    /// Start a new generation, invalidating any live one
    pub fn begin(&self, chat_id: i64) -> TurnTicket {
        let entry = self.entry(chat_id);
        let mut conv = entry.lock().unwrap_or_else(PoisonError::into_inner);

        if conv.phase == Phase::Generating {
            tracing::debug!(
                chat_id,
                superseded_epoch = conv.epoch(),
                "new message supersedes live generation"
            );
        }

        conv.epoch.send_modify(|epoch| *epoch += 1);
        conv.phase = Phase::Generating;
        conv.target = None;
        conv.last_active = Instant::now();

        let epoch = conv.epoch();
        tracing::debug!(chat_id, epoch, "generation started");

        TurnTicket {
            chat_id,
            epoch,
            current: conv.epoch.subscribe(),
        }
    }

    /// Record the placeholder a generation renders into
    pub fn attach(&self, ticket: &TurnTicket, target: MessageHandle) {
        self.with_current(ticket, |conv| conv.target = Some(target));
    }

    /// Return the conversation to idle if `ticket` is still live
    pub fn complete(&self, ticket: &TurnTicket) {
        let done = self.with_current(ticket, |conv| {
            conv.phase = Phase::Idle;
            conv.target = None;
            conv.last_active = Instant::now();
        });
        if done.is_some() {
            tracing::debug!(chat_id = ticket.chat_id, epoch = ticket.epoch, "conversation idle");
        }
    }

    /// Run `f` on the suggestion memory of a live ticket's conversation
    pub fn with_memory<T>(
        &self,
        ticket: &TurnTicket,
        f: impl FnOnce(&mut SuggestionMemory) -> T,
    ) -> Option<T> {
        self.with_current(ticket, |conv| f(&mut conv.memory))
    }

    fn with_current<T>(
        &self,
        ticket: &TurnTicket,
        f: impl FnOnce(&mut Conversation) -> T,
    ) -> Option<T> {
        let entry = self.get(ticket.chat_id)?;
        let mut conv = entry.lock().unwrap_or_else(PoisonError::into_inner);
        (conv.epoch() == ticket.epoch).then(|| f(&mut conv))
    }

    /// Current epoch of a conversation, if it exists
    #[must_use]
    pub fn epoch(&self, chat_id: i64) -> Option<u64> {
        let entry = self.get(chat_id)?;
        let conv = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Some(conv.epoch())
    }

    /// Phase of a conversation, if it exists
    #[must_use]
    pub fn phase(&self, chat_id: i64) -> Option<Phase> {
        let entry = self.get(chat_id)?;
        let conv = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Some(conv.phase)
    }

    /// Drop idle conversations not touched within `ttl`; returns how many
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut map = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = map.len();

        map.retain(|_, entry| {
            let conv = entry.lock().unwrap_or_else(PoisonError::into_inner);
            conv.phase == Phase::Generating || now.duration_since(conv.last_active) < ttl
        });

        before - map.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
