//! Wire shapes of the three streaming protocols the backend may speak
//!
//! Each variant knows its request path, how to build a request body from a
//! [`GenerationRequest`], and how to turn one decoded line of its streamed
//! body into a [`Chunk`].

use serde_json::{Value, json};

use super::GenerationRequest;

/// Streaming protocol variant, in fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Ollama-style `/api/chat` (NDJSON, `message.content`)
    Chat,
    /// Legacy Ollama `/api/generate` (NDJSON, `response`)
    Generate,
    /// OpenAI-compatible `/v1/chat/completions` (SSE, `choices[].delta.content`)
    OpenAiChat,
}

/// Fixed discovery order
pub const FALLBACK_ORDER: [Protocol; 3] = [Protocol::Chat, Protocol::Generate, Protocol::OpenAiChat];

/// One normalized unit parsed out of a stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Generated text
    Text(String),
    /// The backend signalled the end of generation
    Done,
    /// The backend reported an error inside the stream
    Error(String),
    /// Nothing useful on this line (keep-alives, metadata, empty deltas)
    Skip,
}

impl Protocol {
    /// Path appended to the backend base URL
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Chat => "api/chat",
            Self::Generate => "api/generate",
            Self::OpenAiChat => "v1/chat/completions",
        }
    }

    /// Short label for logs
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Generate => "generate",
            Self::OpenAiChat => "openai",
        }
    }

    /// Build the JSON request body for this variant
    #[must_use]
    pub fn body(self, request: &GenerationRequest) -> Value {
        let params = &request.params;
        let options = json!({
            "num_predict": params.num_predict,
            "num_ctx": params.num_ctx,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "repeat_penalty": params.repeat_penalty,
        });

        match self {
            Self::Chat => json!({
                "model": params.model,
                "messages": chat_messages(request),
                "stream": true,
                "options": options,
                "keep_alive": params.keep_alive,
            }),
            Self::Generate => {
                let mut body = json!({
                    "model": params.model,
                    "prompt": request.query,
                    "stream": true,
                    "options": options,
                    "keep_alive": params.keep_alive,
                });
                if let Some(system) = &request.system_prompt {
                    body["system"] = json!(system);
                }
                body
            }
            Self::OpenAiChat => json!({
                "model": params.model,
                "messages": chat_messages(request),
                "stream": true,
                "max_tokens": params.num_predict,
                "temperature": params.temperature,
                "top_p": params.top_p,
            }),
        }
    }

    /// Parse one complete line of the streamed body
    #[must_use]
    pub fn parse_line(self, line: &str) -> Chunk {
        let line = line.trim();
        if line.is_empty() {
            return Chunk::Skip;
        }

        match self {
            Self::Chat | Self::Generate => parse_ndjson(self, line),
            Self::OpenAiChat => parse_sse(line),
        }
    }
}

fn chat_messages(request: &GenerationRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_prompt {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.query }));
    messages
}

fn parse_ndjson(protocol: Protocol, line: &str) -> Chunk {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        tracing::debug!(protocol = protocol.label(), "skipping unparseable stream line");
        return Chunk::Skip;
    };

    if let Some(err) = value.get("error").and_then(Value::as_str) {
        return Chunk::Error(err.to_string());
    }

    let text = match protocol {
        Protocol::Chat => value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str),
        _ => value.get("response").and_then(Value::as_str),
    };

    if let Some(text) = text.filter(|t| !t.is_empty()) {
        return Chunk::Text(text.to_string());
    }

    if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
        return Chunk::Done;
    }

    Chunk::Skip
}

fn parse_sse(line: &str) -> Chunk {
    // Comments, `event:` and `id:` lines carry nothing we need
    let Some(data) = line.strip_prefix("data:") else {
        return Chunk::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Chunk::Done;
    }

    let Ok(value) = serde_json::from_str::<Value>(data) else {
        tracing::debug!("skipping unparseable SSE payload");
        return Chunk::Skip;
    };

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| err.to_string(), ToString::to_string);
        return Chunk::Error(message);
    }

    let choice = value.get("choices").and_then(|c| c.get(0));
    if let Some(text) = choice
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    {
        return Chunk::Text(text.to_string());
    }

    if choice
        .and_then(|c| c.get("finish_reason"))
        .is_some_and(|r| !r.is_null())
    {
        return Chunk::Done;
    }

    Chunk::Skip
}
