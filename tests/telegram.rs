//! Telegram sink tests against an in-process Bot API

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use honey_relay::{EditOutcome, Error, MessageHandle, MessageSink, TelegramChannel};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

type Calls = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

#[derive(Clone)]
struct BotApi {
    calls: Calls,
    /// Canned `(status, body)` per method; anything else answers `{"ok":true,"result":true}`
    answers: Arc<Vec<(&'static str, StatusCode, String)>>,
}

async fn bot_handler(State(api): State<BotApi>, uri: Uri, body: Bytes) -> Response {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
    api.calls.lock().await.push((method.clone(), value));

    match api.answers.iter().find(|(m, _, _)| *m == method) {
        Some((_, status, body)) => (*status, body.clone()).into_response(),
        None => (StatusCode::OK, r#"{"ok":true,"result":true}"#).into_response(),
    }
}

async fn spawn_bot_api(answers: Vec<(&'static str, StatusCode, String)>) -> (TelegramChannel, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let state = BotApi {
        calls: Arc::clone(&calls),
        answers: Arc::new(answers),
    };
    let app = Router::new().fallback(bot_handler).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let channel = TelegramChannel::with_api_base(
        SecretString::from("42:token".to_string()),
        &format!("http://{addr}"),
    );
    (channel, calls)
}

#[tokio::test]
async fn test_create_returns_message_id() {
    let (channel, calls) = spawn_bot_api(vec![(
        "sendMessage",
        StatusCode::OK,
        r#"{"ok":true,"result":{"message_id":555}}"#.to_string(),
    )])
    .await;

    let handle = channel.create(7, "\u{2026}", Some(3)).await.unwrap();
    assert_eq!(
        handle,
        MessageHandle {
            chat_id: 7,
            message_id: 555
        }
    );

    let calls = calls.lock().await;
    assert_eq!(calls[0].0, "sendMessage");
    assert_eq!(calls[0].1["chat_id"], 7);
    assert_eq!(calls[0].1["reply_to_message_id"], 3);
    assert_eq!(calls[0].1["allow_sending_without_reply"], true);
}

#[tokio::test]
async fn test_identical_edit_is_not_modified() {
    let (channel, _calls) = spawn_bot_api(vec![(
        "editMessageText",
        StatusCode::BAD_REQUEST,
        r#"{"ok":false,"error_code":400,"description":"Bad Request: message is not modified"}"#
            .to_string(),
    )])
    .await;

    let outcome = channel
        .update(
            MessageHandle {
                chat_id: 7,
                message_id: 1,
            },
            "same",
        )
        .await
        .unwrap();
    assert_eq!(outcome, EditOutcome::NotModified);
}

#[tokio::test]
async fn test_rate_limited_edit_is_transient_with_hint() {
    let (channel, _calls) = spawn_bot_api(vec![(
        "editMessageText",
        StatusCode::TOO_MANY_REQUESTS,
        r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 3","parameters":{"retry_after":3}}"#
            .to_string(),
    )])
    .await;

    let err = channel
        .update(
            MessageHandle {
                chat_id: 7,
                message_id: 1,
            },
            "text",
        )
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_rejected_edit_is_permanent() {
    let (channel, _calls) = spawn_bot_api(vec![(
        "editMessageText",
        StatusCode::BAD_REQUEST,
        r#"{"ok":false,"error_code":400,"description":"Bad Request: message to edit not found"}"#
            .to_string(),
    )])
    .await;

    let err = channel
        .update(
            MessageHandle {
                chat_id: 7,
                message_id: 1,
            },
            "text",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Channel(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_blocked_chat_is_permanent() {
    let (channel, _calls) = spawn_bot_api(vec![(
        "sendMessage",
        StatusCode::FORBIDDEN,
        r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#
            .to_string(),
    )])
    .await;

    let err = channel.send(7, "hi", None).await.unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_acknowledge_sends_typing() {
    let (channel, calls) = spawn_bot_api(Vec::new()).await;

    channel.acknowledge(7).await.unwrap();

    let calls = calls.lock().await;
    assert_eq!(calls[0].0, "sendChatAction");
    assert_eq!(calls[0].1["action"], "typing");
}

#[tokio::test]
async fn test_set_webhook_registers_secret() {
    let (channel, calls) = spawn_bot_api(Vec::new()).await;

    channel
        .set_webhook("https://relay.example/telegram/42:token", Some("s3cret"))
        .await
        .unwrap();

    let calls = calls.lock().await;
    assert_eq!(calls[0].0, "setWebhook");
    assert_eq!(calls[0].1["secret_token"], "s3cret");
    assert_eq!(calls[0].1["allowed_updates"], serde_json::json!(["message"]));
}

#[tokio::test]
async fn test_get_me_reads_bot_identity() {
    let (channel, _calls) = spawn_bot_api(vec![(
        "getMe",
        StatusCode::OK,
        r#"{"ok":true,"result":{"id":42,"is_bot":true,"username":"honey_bot"}}"#.to_string(),
    )])
    .await;

    let bot = channel.get_me().await.unwrap();
    assert_eq!(bot.id, 42);
    assert_eq!(bot.username.as_deref(), Some("honey_bot"));
}
