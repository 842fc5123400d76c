//! Messaging sinks
//!
//! A sink is where rendered output goes. The relay only needs four
//! operations from it: create a message, replace a message's text, send a
//! standalone reply, and acknowledge receipt (typing indicator).

pub mod telegram;

use async_trait::async_trait;

pub use telegram::{TelegramChannel, UpdateDedup};

use crate::Result;

/// Telegram's hard cap on message text length, in characters
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Handle to a message previously created through a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Result of a successful text replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The displayed text changed
    Updated,
    /// The platform reported the text was already identical
    NotModified,
}

/// Outbound side of a chat platform
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sink name for logs
    fn name(&self) -> &'static str;

    /// Create a new message and return its handle
    async fn create(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<MessageHandle>;

    /// Replace the displayed text of an existing message
    async fn update(&self, handle: MessageHandle, text: &str) -> Result<EditOutcome>;

    /// Send a standalone message (command replies, nudges)
    async fn send(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()>;

    /// Lightweight liveness signal shown to the user on receipt
    async fn acknowledge(&self, chat_id: i64) -> Result<()>;
}
