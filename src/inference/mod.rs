//! Inference client for a locally hosted model backend
//!
//! The backend's API shape is not known up front. Every request walks
//! [`FALLBACK_ORDER`] and uses the first variant that accepts the request;
//! the choice is never cached, so a backend reconfigured mid-session is
//! picked up on the next turn. Callers only ever see a [`FragmentStream`] of
//! plain text.

mod decoder;
pub mod protocol;

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{BoxStream, Stream, StreamExt as _};
use reqwest::Client;
use url::Url;

pub use decoder::LineDecoder;
pub use protocol::{Chunk, FALLBACK_ORDER, Protocol};

use crate::{Error, Result};

/// Generation knobs passed through to the backend unmodified
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub num_predict: u32,
    /// Context window size
    pub num_ctx: u32,
    /// How long the backend keeps the model resident between requests
    pub keep_alive: String,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            model: "qwen2.5".to_string(),
            num_predict: 180,
            num_ctx: 2048,
            keep_alive: "30m".to_string(),
            temperature: 0.3,
            top_p: 0.9,
            repeat_penalty: 1.15,
        }
    }
}

/// One generation for one conversation epoch
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Conversation the request belongs to
    pub chat_id: i64,
    /// Conversation epoch at creation time
    pub epoch: u64,
    /// User text
    pub query: String,
    /// Optional system prompt
    pub system_prompt: Option<String>,
    pub params: InferenceParams,
}

/// Lazy, finite, non-restartable sequence of text fragments
///
/// Ends with `None` on normal completion. A mid-stream failure is yielded
/// once as `Err(Error::StreamInterrupted)` and the stream ends after it.
pub struct FragmentStream {
    protocol: Protocol,
    inner: BoxStream<'static, Result<String>>,
}

impl FragmentStream {
    /// Wrap an already-normalized fragment stream
    pub fn new<S>(protocol: Protocol, inner: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            protocol,
            inner: inner.boxed(),
        }
    }

    /// Normalize a raw streamed body of `protocol` into text fragments
    pub fn from_body<S, B, E>(protocol: Protocol, body: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + 'static,
        E: Display + 'static,
    {
        let state = BodyState {
            body: body
                .map(|item| item.map(|b| b.as_ref().to_vec()).map_err(|e| e.to_string()))
                .boxed(),
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let inner = futures::stream::unfold(state, move |mut st| async move {
            loop {
                if let Some(chunk) = st.pending.pop_front() {
                    match chunk {
                        Chunk::Text(text) => return Some((Ok(text), st)),
                        Chunk::Skip => continue,
                        Chunk::Done => return None,
                        Chunk::Error(message) => {
                            st.finished = true;
                            st.pending.clear();
                            return Some((Err(Error::StreamInterrupted(message)), st));
                        }
                    }
                }

                if st.finished {
                    return None;
                }

                match st.body.next().await {
                    Some(Ok(bytes)) => {
                        for line in st.decoder.push(&bytes) {
                            st.pending.push_back(protocol.parse_line(&line));
                        }
                    }
                    Some(Err(message)) => {
                        st.finished = true;
                        return Some((Err(Error::StreamInterrupted(message)), st));
                    }
                    None => {
                        st.finished = true;
                        if let Some(line) = st.decoder.finish() {
                            st.pending.push_back(protocol.parse_line(&line));
                        }
                    }
                }
            }
        });

        Self::new(protocol, inner)
    }

    /// Protocol variant that produced this stream
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl Stream for FragmentStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

struct BodyState {
    body: BoxStream<'static, std::result::Result<Vec<u8>, String>>,
    decoder: LineDecoder,
    pending: VecDeque<Chunk>,
    finished: bool,
}

/// Outcome of trying a single protocol variant
#[derive(Debug)]
pub enum Attempt {
    /// The backend accepted the request and the body is streaming
    Started(FragmentStream),
    /// Connection or HTTP status failure; the next variant may be tried
    RouteFailed(String),
}

/// HTTP client for the model backend
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: Url,
}

impl InferenceClient {
    /// Create a client for the backend at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: Url, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build inference client: {e}")))?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
        })
    }

    /// Backend base URL
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start streaming a generation, discovering the protocol variant
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendUnavailable` with the last observed failure when
    /// no variant starts a stream
    pub async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream> {
        let mut last_error = String::from("no protocol attempted");

        for protocol in FALLBACK_ORDER {
            match self.attempt(protocol, request).await {
                Attempt::Started(stream) => {
                    tracing::debug!(
                        chat_id = request.chat_id,
                        epoch = request.epoch,
                        protocol = protocol.label(),
                        "inference stream started"
                    );
                    return Ok(stream);
                }
                Attempt::RouteFailed(reason) => {
                    tracing::debug!(
                        chat_id = request.chat_id,
                        protocol = protocol.label(),
                        reason = %reason,
                        "protocol variant refused, falling back"
                    );
                    last_error = format!("{}: {reason}", protocol.label());
                }
            }
        }

        tracing::warn!(chat_id = request.chat_id, last_error = %last_error, "inference backend unavailable");
        Err(Error::BackendUnavailable { last_error })
    }

    /// Try one protocol variant
    pub async fn attempt(&self, protocol: Protocol, request: &GenerationRequest) -> Attempt {
        let url = match self.base_url.join(protocol.path()) {
            Ok(url) => url,
            Err(e) => return Attempt::RouteFailed(format!("bad url: {e}")),
        };

        let response = match self
            .client
            .post(url)
            .json(&protocol.body(request))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::RouteFailed(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::RouteFailed(format!("{status} {}", body.trim()));
        }

        Attempt::Started(FragmentStream::from_body(protocol, response.bytes_stream()))
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
