//! Throttled rendering of a fragment stream into one outbound message
//!
//! The renderer owns the text of a single turn. It accumulates fragments,
//! replaces the displayed text at a bounded rate, and finalizes the message
//! exactly once. Every sink call is preceded by an epoch check so output of a
//! superseded turn never reaches the user.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::time::{Instant, sleep};

use crate::channels::telegram::RetryPolicy;
use crate::channels::{EditOutcome, MAX_MESSAGE_CHARS, MessageHandle, MessageSink};
use crate::inference::FragmentStream;
use crate::turn::TurnTicket;
use crate::{Error, Result};

/// Text shown while the first fragments are on their way
pub const PLACEHOLDER: &str = "\u{2026}";

/// Appended when a reply is cut at the length cap
pub const TRUNCATION_NOTICE: &str = "\n\n\u{2026}(truncated for length)";

/// Final text of a completed generation that produced nothing
pub const EMPTY_REPLY: &str = "No response.";

/// Default minimum time between intermediate updates
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;

/// Default growth that forces an intermediate update
pub const DEFAULT_MIN_DELTA: usize = 120;

/// Default reply length cap
pub const DEFAULT_MAX_CHARS: usize = 3500;

/// Rate and size limits for rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Minimum time since the last successful update
    pub min_interval: Duration,
    /// Growth in characters that triggers an update regardless of time
    pub min_delta: usize,
    /// Reply length cap; further fragments are dropped
    pub max_chars: usize,
    /// Retry for a failed update
    pub retry: RetryPolicy,
    /// How long intermediate updates stay suppressed after a failed retry
    pub degraded_backoff: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            min_delta: DEFAULT_MIN_DELTA,
            max_chars: DEFAULT_MAX_CHARS,
            retry: RetryPolicy::default(),
            degraded_backoff: Duration::from_secs(5),
        }
    }
}

/// Result of appending a fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// Fragment appended; keep reading
    Accepted,
    /// Length cap reached; stop reading
    Capped,
}

/// What the final flush put on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Whether the sink accepted the final text
    pub delivered: bool,
}

/// Mutable render state for one generation
#[derive(Debug)]
struct RenderState {
    target: MessageHandle,
    buffer: String,
    chars: usize,
    last_sent_chars: usize,
    last_sent_at: Instant,
    suppressed_until: Option<Instant>,
    truncated: bool,
}

/// Renders one turn into the message identified by its target handle
pub struct Renderer {
    sink: Arc<dyn MessageSink>,
    ticket: TurnTicket,
    config: RenderConfig,
    state: RenderState,
}

impl Renderer {
    /// Start rendering into `target`, created just before this call
    #[must_use]
    pub fn new(
        sink: Arc<dyn MessageSink>,
        target: MessageHandle,
        ticket: TurnTicket,
        config: &RenderConfig,
    ) -> Self {
        let mut config = config.clone();
        let notice_chars = TRUNCATION_NOTICE.chars().count();
        config.max_chars = config.max_chars.clamp(1, MAX_MESSAGE_CHARS - notice_chars);

        Self {
            sink,
            ticket,
            config,
            state: RenderState {
                target,
                buffer: String::new(),
                chars: 0,
                last_sent_chars: 0,
                last_sent_at: Instant::now(),
                suppressed_until: None,
                truncated: false,
            },
        }
    }

    /// Accumulated text so far
    #[must_use]
    pub fn text(&self) -> &str {
        &self.state.buffer
    }

    #[must_use]
    pub const fn target(&self) -> MessageHandle {
        self.state.target
    }

    /// Whether the reply was cut at the length cap
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.state.truncated
    }

    /// Read `stream` to its end, updating the message along the way
    ///
    /// # Errors
    ///
    /// Returns the stream's own failure, or `Error::Superseded` once the turn
    /// is no longer current
    pub async fn consume(&mut self, mut stream: FragmentStream) -> Result<()> {
        while let Some(fragment) = stream.next().await {
            if self.push(&fragment?).await? == Push::Capped {
                tracing::debug!(
                    chat_id = self.ticket.chat_id(),
                    epoch = self.ticket.epoch(),
                    "reply reached length cap, stopped reading"
                );
                break;
            }
        }
        Ok(())
    }

    /// Append a fragment and flush if the throttle allows
    ///
    /// # Errors
    ///
    /// Returns `Error::Superseded` if the turn is no longer current
    pub async fn push(&mut self, fragment: &str) -> Result<Push> {
        if self.state.truncated {
            return Ok(Push::Capped);
        }
        if !self.ticket.is_current() {
            return Err(Error::Superseded);
        }

        let incoming = fragment.chars().count();
        if self.state.chars + incoming >= self.config.max_chars {
            let keep = self.config.max_chars - self.state.chars;
            self.state.buffer.push_str(prefix_chars(fragment, keep));
            self.state.buffer.push_str(TRUNCATION_NOTICE);
            self.state.chars = self.state.buffer.chars().count();
            self.state.truncated = true;
            return Ok(Push::Capped);
        }

        self.state.buffer.push_str(fragment);
        self.state.chars += incoming;

        if self.should_flush(Instant::now()) {
            self.flush_intermediate().await?;
        }

        Ok(Push::Accepted)
    }

    fn should_flush(&self, now: Instant) -> bool {
        let grown = self.state.chars.saturating_sub(self.state.last_sent_chars);
        if grown == 0 || self.state.buffer.trim().is_empty() {
            return false;
        }
        if self.state.suppressed_until.is_some_and(|until| now < until) {
            return false;
        }

        now.duration_since(self.state.last_sent_at) >= self.config.min_interval
            || grown >= self.config.min_delta
    }

    async fn flush_intermediate(&mut self) -> Result<()> {
        let text = self.state.buffer.clone();
        let delivered = self.deliver(&text).await?;
        let now = Instant::now();

        self.state.last_sent_at = now;
        if delivered {
            self.state.last_sent_chars = self.state.chars;
            self.state.suppressed_until = None;
        } else {
            tracing::warn!(
                chat_id = self.ticket.chat_id(),
                epoch = self.ticket.epoch(),
                backoff_ms = self.config.degraded_backoff.as_millis(),
                "update failed after retry, suppressing intermediate updates"
            );
            self.state.suppressed_until = Some(now + self.config.degraded_backoff);
        }

        Ok(())
    }

    /// Send `text` to the target, retrying a transient failure per the retry
    /// policy
    ///
    /// Returns `Ok(false)` when every attempt failed.
    async fn deliver(&self, text: &str) -> Result<bool> {
        let mut attempt = 0;
        loop {
            if !self.ticket.is_current() {
                return Err(Error::Superseded);
            }

            match self.sink.update(self.state.target, text).await {
                Ok(EditOutcome::Updated | EditOutcome::NotModified) => return Ok(true),
                Err(e) if e.is_transient() && attempt < self.config.retry.max_retries => {
                    let delay = self.config.retry.delay_for_attempt(attempt, e.retry_after());
                    tracing::debug!(
                        chat_id = self.ticket.chat_id(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "update failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        sink = self.sink.name(),
                        chat_id = self.ticket.chat_id(),
                        error = %e,
                        "update failed"
                    );
                    return Ok(false);
                }
            }
        }
    }

    /// Final flush of a completed generation, with an optional trailing block
    ///
    /// The trailer is dropped when it would push the message past the
    /// platform limit. Runs even while intermediate updates are suppressed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Superseded` if the turn is no longer current
    pub async fn finish(self, trailer: &str) -> Result<Rendered> {
        let body = if self.state.buffer.trim().is_empty() {
            EMPTY_REPLY
        } else {
            self.state.buffer.as_str()
        };

        let body_chars = body.chars().count();
        let text = if body_chars + trailer.chars().count() <= MAX_MESSAGE_CHARS {
            format!("{body}{trailer}")
        } else {
            if !trailer.is_empty() {
                tracing::debug!(chat_id = self.ticket.chat_id(), "trailer dropped, reply too long");
            }
            prefix_chars(body, MAX_MESSAGE_CHARS).to_string()
        };

        let delivered = self.deliver(&text).await?;
        if !delivered {
            tracing::error!(
                chat_id = self.ticket.chat_id(),
                epoch = self.ticket.epoch(),
                "final update failed, message left at last successful text"
            );
        }

        Ok(Rendered { text, delivered })
    }

    /// Finalize with a failure notice
    ///
    /// Text already produced stays and the notice is appended. With no text,
    /// the notice alone replaces the placeholder.
    ///
    /// # Errors
    ///
    /// Returns `Error::Superseded` if the turn is no longer current
    pub async fn fail(self, notice: &str) -> Result<Rendered> {
        let partial = self.state.buffer.trim_end();
        let text = if partial.is_empty() {
            notice.to_string()
        } else {
            let keep = MAX_MESSAGE_CHARS.saturating_sub(notice.chars().count() + 2);
            format!("{}\n\n{notice}", prefix_chars(partial, keep))
        };

        let delivered = self.deliver(&text).await?;
        Ok(Rendered { text, delivered })
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("sink", &self.sink.name())
            .field("ticket", &self.ticket)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Longest prefix of `s` with at most `max` characters
fn prefix_chars(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(idx, _)| &s[..idx])
}
