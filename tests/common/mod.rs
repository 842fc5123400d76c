//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::StreamExt as _;
use honey_relay::{
    Catalog, EditOutcome, Error, InferenceClient, MessageHandle, MessageSink, RenderConfig,
    SuggestionMatcher, TurnCoordinator, TurnSettings,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use url::Url;

/// One call made against the mock sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Ack { chat_id: i64 },
    Create { chat_id: i64, message_id: i64, text: String },
    Update { message_id: i64, text: String },
    Send { chat_id: i64, text: String },
}

/// Mock sink recording every operation
#[derive(Default)]
pub struct MockSink {
    ops: Mutex<Vec<SinkOp>>,
    update_failures: Mutex<VecDeque<Error>>,
    next_id: AtomicI64,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        })
    }

    /// Fail the next `update` calls with these errors, in order
    pub async fn fail_updates(&self, errors: Vec<Error>) {
        self.update_failures.lock().await.extend(errors);
    }

    pub async fn ops(&self) -> Vec<SinkOp> {
        self.ops.lock().await.clone()
    }

    /// Messages created, in order
    pub async fn created(&self) -> Vec<(i64, String)> {
        self.ops()
            .await
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Create {
                    message_id, text, ..
                } => Some((message_id, text)),
                _ => None,
            })
            .collect()
    }

    /// Every text written to `message_id`, in order
    pub async fn updates_for(&self, message_id: i64) -> Vec<String> {
        self.ops()
            .await
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Update {
                    message_id: id,
                    text,
                } if id == message_id => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Last text shown in `message_id`
    pub async fn final_text(&self, message_id: i64) -> Option<String> {
        self.updates_for(message_id).await.pop()
    }

    /// Standalone messages sent
    pub async fn sent(&self) -> Vec<String> {
        self.ops()
            .await
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessageSink for MockSink {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create(
        &self,
        chat_id: i64,
        text: &str,
        _reply_to: Option<i64>,
    ) -> honey_relay::Result<MessageHandle> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.ops.lock().await.push(SinkOp::Create {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(MessageHandle {
            chat_id,
            message_id,
        })
    }

    async fn update(&self, handle: MessageHandle, text: &str) -> honey_relay::Result<EditOutcome> {
        self.ops.lock().await.push(SinkOp::Update {
            message_id: handle.message_id,
            text: text.to_string(),
        });
        match self.update_failures.lock().await.pop_front() {
            Some(e) => Err(e),
            None => Ok(EditOutcome::Updated),
        }
    }

    async fn send(&self, chat_id: i64, text: &str, _reply_to: Option<i64>) -> honey_relay::Result<()> {
        self.ops.lock().await.push(SinkOp::Send {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn acknowledge(&self, chat_id: i64) -> honey_relay::Result<()> {
        self.ops.lock().await.push(SinkOp::Ack { chat_id });
        Ok(())
    }
}

/// How the mock backend answers one request
#[derive(Debug, Clone)]
pub struct Script {
    pub lines: Vec<String>,
    /// Pause before each line
    pub delay: Duration,
}

impl Script {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// NDJSON body of an `/api/chat` stream
pub fn chat_lines(fragments: &[&str]) -> Vec<String> {
    let mut lines: Vec<String> = fragments
        .iter()
        .map(|f| format!("{}\n", serde_json::json!({"message": {"content": f}, "done": false})))
        .collect();
    lines.push("{\"message\":{\"content\":\"\"},\"done\":true}\n".to_string());
    lines
}

/// SSE body of a `/v1/chat/completions` stream
pub fn openai_lines(fragments: &[&str]) -> Vec<String> {
    let mut lines: Vec<String> = fragments
        .iter()
        .map(|f| {
            format!(
                "data: {}\n\n",
                serde_json::json!({"choices": [{"delta": {"content": f}}]})
            )
        })
        .collect();
    lines.push("data: [DONE]\n\n".to_string());
    lines
}

/// Decides the answer for `(path, request body)`; `None` means 404
pub type Responder = Arc<dyn Fn(&str, &serde_json::Value) -> Option<Script> + Send + Sync>;

/// In-process inference backend
pub struct MockBackend {
    pub url: Url,
    /// `(path, body)` of every request received
    pub requests: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

#[derive(Clone)]
struct BackendState {
    responder: Responder,
    requests: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

async fn backend_handler(State(state): State<BackendState>, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
    state.requests.lock().await.push((path.clone(), value.clone()));

    let Some(script) = (state.responder)(&path, &value) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let delay = script.delay;
    let stream = futures::stream::iter(script.lines).then(move |line| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok::<_, Infallible>(line)
    });

    Response::new(Body::from_stream(stream))
}

impl MockBackend {
    /// Serve on an ephemeral local port
    pub async fn spawn(responder: Responder) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = BackendState {
            responder,
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(backend_handler).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            requests,
        }
    }

    /// Backend that answers only `path` with `script`
    pub async fn only(path: &'static str, script: Script) -> Self {
        Self::spawn(Arc::new(move |p: &str, _: &serde_json::Value| {
            (p == path).then(|| script.clone())
        }))
        .await
    }

    /// Paths requested so far, in order
    pub async fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }
}

/// Render settings that flush on every fragment
pub fn eager_render() -> RenderConfig {
    RenderConfig {
        min_interval: Duration::ZERO,
        min_delta: 1,
        ..RenderConfig::default()
    }
}

/// Coordinator wired to the mock backend, a mock sink and the embedded catalog
pub fn coordinator(backend: &Url, sink: Arc<MockSink>, settings: TurnSettings) -> TurnCoordinator {
    let client = InferenceClient::new(backend.clone(), Duration::from_secs(2)).unwrap();
    let matcher = SuggestionMatcher::new(
        Arc::new(Catalog::embedded().unwrap()),
        3,
        Duration::from_secs(1800),
    );
    TurnCoordinator::new(client, sink, matcher, settings)
}

/// Base URL with nothing listening
pub async fn dead_backend() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// Poll until the sink has recorded at least `count` operations
pub async fn wait_for_ops(sink: &MockSink, count: usize) -> Vec<SinkOp> {
    for _ in 0..200 {
        let ops = sink.ops().await;
        if ops.len() >= count {
            return ops;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.ops().await
}
