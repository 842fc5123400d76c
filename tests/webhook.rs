//! Webhook ingress tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use honey_relay::api::webhooks::telegram::{
    Dispatch, Handled, SECRET_HEADER, dispatch, execute, process_message,
};
use honey_relay::commands::Command;
use honey_relay::{ApiState, InboundMessage, TurnOutcome};
use secrecy::SecretString;
use tower::ServiceExt;

mod common;
use common::{MockBackend, MockSink, Script, SinkOp, chat_lines, coordinator, eager_render, wait_for_ops};

const TOKEN: &str = "123:abc";
const SECRET: &str = "s3cret";

async fn build_state(sink: Arc<MockSink>, secret: Option<&str>) -> Arc<ApiState> {
    let backend = MockBackend::only("/api/chat", Script::new(chat_lines(&["Stay dry."]))).await;
    let coord = coordinator(
        &backend.url,
        sink,
        honey_relay::TurnSettings {
            render: eager_render(),
            ..Default::default()
        },
    );
    Arc::new(ApiState::new(
        Arc::new(coord),
        SecretString::from(TOKEN.to_string()),
        secret.map(|s| SecretString::from(s.to_string())),
    ))
}

fn update(update_id: i64, text: &str) -> String {
    serde_json::json!({
        "update_id": update_id,
        "message": {
            "message_id": 10,
            "date": 1_700_000_000,
            "chat": {"id": 77, "type": "private"},
            "from": {"id": 5, "is_bot": false},
            "text": text,
        }
    })
    .to_string()
}

fn post(path: &str, secret: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::post(path).header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    builder.body(Body::from(body)).unwrap()
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: 77,
        message_id: Some(10),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_secret_mismatch_is_unauthorized() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink.clone(), Some(SECRET)).await);

    let response = app
        .clone()
        .oneshot(post("/telegram/123:abc", Some("wrong"), update(1, "hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(post("/telegram/123:abc", None, update(2, "hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.ops().await.is_empty());
}

#[tokio::test]
async fn test_wrong_path_token_is_not_found() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink, Some(SECRET)).await);

    let response = app
        .oneshot(post("/telegram/999:zzz", Some(SECRET), update(1, "hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_valid_update_is_acknowledged_and_processed() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink.clone(), Some(SECRET)).await);

    let response = app
        .oneshot(post("/telegram/123:abc", Some(SECRET), update(1, "storm coming")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["ok"], true);

    let ops = wait_for_ops(&sink, 3).await;
    assert_eq!(ops[0], SinkOp::Ack { chat_id: 77 });
    assert!(matches!(ops[1], SinkOp::Create { chat_id: 77, .. }));
}

#[tokio::test]
async fn test_secret_check_disabled_without_secret() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink.clone(), None).await);

    let response = app
        .oneshot(post("/telegram/123:abc", None, update(1, "/start")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(wait_for_ops(&sink, 1).await.len(), 1);
}

#[tokio::test]
async fn test_non_message_update_is_ignored() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink.clone(), Some(SECRET)).await);

    let body = serde_json::json!({
        "update_id": 5,
        "edited_message": {"message_id": 1, "chat": {"id": 77}, "date": 0, "text": "x"}
    })
    .to_string();
    let response = app
        .oneshot(post("/telegram/123:abc", Some(SECRET), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.ops().await.is_empty());
}

#[tokio::test]
async fn test_malformed_update_is_bad_request() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink, Some(SECRET)).await);

    let response = app
        .oneshot(post("/telegram/123:abc", Some(SECRET), "{not json".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_update_is_processed_once() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink.clone(), Some(SECRET)).await);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post("/telegram/123:abc", Some(SECRET), update(9, "/help")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    wait_for_ops(&sink, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.sent().await.len(), 1);
}

#[tokio::test]
async fn test_buy_command_bypasses_generation() {
    let sink = MockSink::new();
    let state = build_state(sink.clone(), None).await;

    let handled = process_message(&state, inbound("/buy radio")).await;
    assert!(matches!(handled, Handled::Command(Command::Buy(ref k)) if k == "radio"));

    let sent = sink.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("https://amzn.to/4714QVe"));
    assert!(sink.created().await.is_empty());
}

#[tokio::test]
async fn test_buy_lookup_ignores_cooldown() {
    let sink = MockSink::new();
    let state = build_state(sink.clone(), None).await;

    // Reply-triggered path records the radio for this chat
    let handled = process_message(&state, inbound("power outage radio")).await;
    assert!(matches!(
        handled,
        Handled::Turn(TurnOutcome::Completed { ref suggested, .. }) if suggested.iter().any(|i| i.id == "weather-radio")
    ));

    process_message(&state, inbound("/buy radio")).await;
    assert!(sink.sent().await[0].contains("https://amzn.to/4714QVe"));
}

#[tokio::test]
async fn test_topic_gate_nudges_off_topic_messages() {
    let sink = MockSink::new();
    let state = build_state(sink.clone(), None).await;
    let state = Arc::new(
        Arc::try_unwrap(state)
            .expect("state is not shared yet")
            .with_topic_gate(true),
    );

    let handled = process_message(&state, inbound("write me a poem about cats")).await;
    assert!(matches!(handled, Handled::Nudged));
    assert!(sink.sent().await[0].contains("/topics"));
    assert!(sink.created().await.is_empty());

    let handled = process_message(&state, inbound("blackout checklist please")).await;
    assert!(matches!(handled, Handled::Turn(TurnOutcome::Completed { .. })));
}

#[tokio::test]
async fn test_epochs_follow_arrival_order() {
    let sink = MockSink::new();
    let state = build_state(sink.clone(), None).await;

    let first = inbound("storm coming");
    let second = inbound("storm is here");
    let first_route = dispatch(&state, &first);
    let second_route = dispatch(&state, &second);
    assert!(matches!(first_route, Dispatch::Turn(ref t) if t.epoch() == 1));
    assert!(matches!(second_route, Dispatch::Turn(ref t) if t.epoch() == 2));

    // Even when the later message's task runs first, it owns the conversation
    let handled = execute(&state, second, second_route).await;
    assert!(matches!(handled, Handled::Turn(TurnOutcome::Completed { .. })));
    let handled = execute(&state, first, first_route).await;
    assert!(matches!(handled, Handled::Turn(TurnOutcome::Superseded)));

    assert_eq!(sink.created().await.len(), 1);
}

#[tokio::test]
async fn test_webhook_claims_epoch_before_responding() {
    let sink = MockSink::new();
    let state = build_state(sink.clone(), None).await;
    let app = honey_relay::api::router(Arc::clone(&state));

    for (id, text) in [(1, "storm coming"), (2, "/help"), (3, "storm is here")] {
        let response = app
            .clone()
            .oneshot(post("/telegram/123:abc", None, update(id, text)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Commands do not claim an epoch
    assert_eq!(state.coordinator.conversations().epoch(77), Some(2));
}

#[tokio::test]
async fn test_health_endpoints() {
    let sink = MockSink::new();
    let app = honey_relay::api::router(build_state(sink, None).await);

    for path in ["/healthz", "/health"] {
        let response = app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
