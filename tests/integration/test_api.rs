//! Integration tests for the session HTTP API and event stream.
//!
//! A real server is started against mock judge and AI backends; requests go
//! through `reqwest` and events are read with a WebSocket client.

mod support;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use judgeloop_orchestrator::{
    encoding, error::QUOTA_EXCEEDED_MESSAGE, events::CodeSource, regen::REGEN_FAILURE_MESSAGE,
    session::COMPILE_SUCCESS_MESSAGE, NotificationLevel, SessionEvent, SessionSnapshot,
};
use serde_json::{json, Value};
use support::{report, report_with, Harness, TEST_API_KEY};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_client(addr: SocketAddr) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next event, answering pings on the way.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Collects events up to and including the first notification.
async fn events_until_notification(client: &mut WsClient) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        let event = receive_event(client).await;
        let done = matches!(event, SessionEvent::Notification(_));
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Connects and consumes the `connected` event.
async fn connected_client(addr: SocketAddr) -> (WsClient, SessionSnapshot) {
    let mut client = connect_client(addr).await;
    match receive_event(&mut client).await {
        SessionEvent::Connected(payload) => (client, payload.session),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

async fn get_snapshot(http: &reqwest::Client, addr: SocketAddr) -> SessionSnapshot {
    http.get(url(addr, "/api/session"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid snapshot")
}

// ============================================================================
// Event stream
// ============================================================================

#[tokio::test]
async fn test_connected_event_carries_snapshot() {
    let harness = Harness::start().await;
    harness.session.set_code("print(42)").await;
    let addr = harness.serve_api().await;

    let (_client, snapshot) = connected_client(addr).await;

    assert_eq!(snapshot.code, "print(42)");
    assert_eq!(snapshot.language.id, 63);
    assert!(!snapshot.processing);
}

#[tokio::test]
async fn test_every_client_receives_events() {
    let harness = Harness::start().await;
    let addr = harness.serve_api().await;
    let (mut first, _) = connected_client(addr).await;
    let (mut second, _) = connected_client(addr).await;

    let response = reqwest::Client::new()
        .put(url(addr, "/api/session/language"))
        .json(&json!({ "id": 71 }))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 200);

    for client in [&mut first, &mut second] {
        match receive_event(client).await {
            SessionEvent::LanguageChanged(payload) => assert_eq!(payload.language.id, 71),
            other => panic!("Expected LanguageChanged event, got: {other:?}"),
        }
    }
}

// ============================================================================
// Compile
// ============================================================================

#[tokio::test]
async fn test_compile_end_to_end() {
    let harness = Harness::start().await;
    harness.judge.script(vec![
        report(1, "In Queue"),
        report(2, "Processing"),
        report_with(3, "Accepted", "stdout", "NQo="),
    ]);
    let addr = harness.serve_api().await;
    let http = reqwest::Client::new();
    let (mut client, _) = connected_client(addr).await;

    let response = http
        .put(url(addr, "/api/session/code"))
        .json(&json!({ "code": "console.log(5)" }))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 204);

    let response = http
        .post(url(addr, "/api/compile"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 202);

    let events = events_until_notification(&mut client).await;
    let names: Vec<_> = events.iter().map(SessionEvent::event_name).collect();
    assert_eq!(names, vec!["compile_started", "output_updated", "notification"]);

    match &events[1] {
        SessionEvent::OutputUpdated(payload) => {
            assert!(!payload.error_occurred);
            assert_eq!(payload.outcome.as_ref().unwrap().display_text(), "5\n");
        }
        other => panic!("Expected OutputUpdated event, got: {other:?}"),
    }
    match &events[2] {
        SessionEvent::Notification(payload) => {
            assert_eq!(payload.level, NotificationLevel::Success);
            assert_eq!(payload.message, COMPILE_SUCCESS_MESSAGE);
        }
        other => panic!("Expected Notification event, got: {other:?}"),
    }

    let submissions = harness.judge.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0]["language_id"], 63);
    let source = submissions[0]["source_code"].as_str().unwrap();
    assert_eq!(encoding::decode(source).unwrap(), "console.log(5)");
    assert_eq!(
        harness.judge.api_keys(),
        vec![Some(TEST_API_KEY.to_string())]
    );
    assert_eq!(harness.judge.polls().len(), 3);

    let snapshot = get_snapshot(&http, addr).await;
    assert!(!snapshot.processing);
    assert_eq!(snapshot.output.unwrap().stdout.as_deref(), Some("NQo="));
}

#[tokio::test]
async fn test_compile_quota_exceeded_notification() {
    let harness = Harness::start().await;
    harness.judge.exhaust_quota();
    let addr = harness.serve_api().await;
    let (mut client, _) = connected_client(addr).await;

    let response = reqwest::Client::new()
        .post(url(addr, "/api/compile"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 202);

    let events = events_until_notification(&mut client).await;
    match events.last().unwrap() {
        SessionEvent::Notification(payload) => {
            assert_eq!(payload.level, NotificationLevel::Error);
            assert_eq!(payload.message, QUOTA_EXCEEDED_MESSAGE);
            assert_eq!(payload.duration_ms, 10_000);
        }
        other => panic!("Expected Notification event, got: {other:?}"),
    }
    assert!(harness.judge.polls().is_empty());
}

#[tokio::test]
async fn test_compile_empty_source_is_rejected() {
    let harness = Harness::start().await;
    harness.session.set_code("  ").await;
    let addr = harness.serve_api().await;

    let response = reqwest::Client::new()
        .post(url(addr, "/api/compile"))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("empty"));
    assert!(harness.judge.submissions().is_empty());
}

// ============================================================================
// Regenerate
// ============================================================================

#[tokio::test]
async fn test_regenerate_replaces_code_and_clears_error() {
    let harness = Harness::start().await;
    let stderr = encoding::encode("ReferenceError: consol is not defined");
    harness
        .judge
        .script(vec![report_with(11, "Runtime Error (NZEC)", "stderr", &stderr)]);
    harness
        .ai
        .answer_regen(json!({ "response": "console.log(5);" }));
    harness.session.set_code("consol.log(5);").await;
    let addr = harness.serve_api().await;
    let http = reqwest::Client::new();
    let (mut client, _) = connected_client(addr).await;

    http.post(url(addr, "/api/compile"))
        .send()
        .await
        .expect("Request failed");
    events_until_notification(&mut client).await;
    assert!(get_snapshot(&http, addr).await.error_occurred);

    let response = http
        .post(url(addr, "/api/regenerate"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 202);

    let events = events_until_notification(&mut client).await;
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::CodeReplaced(p) if p.source == CodeSource::Regeneration && p.code == "console.log(5);"
    )));

    let bodies = harness.ai.regen_bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["error"], "ReferenceError: consol is not defined");
    assert_eq!(bodies[0]["code"], "consol.log(5);");
    assert_eq!(bodies[0]["language"], "javascript");

    let snapshot = get_snapshot(&http, addr).await;
    assert_eq!(snapshot.code, "console.log(5);");
    assert!(!snapshot.regenerating);
    let output = snapshot.output.unwrap();
    assert_eq!(output.stderr.as_deref(), Some(""));
    assert_eq!(output.compile_output.as_deref(), Some(""));

    // Nothing left to fix
    let response = http
        .post(url(addr, "/api/regenerate"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_regenerate_malformed_answer_keeps_code() {
    let harness = Harness::start().await;
    let compile_output = encoding::encode("main.c:1: error: expected ';'");
    harness.judge.script(vec![report_with(
        6,
        "Compilation Error",
        "compile_output",
        &compile_output,
    )]);
    harness.ai.answer_regen(json!({ "fixed": "int main() {}" }));
    harness.session.set_code("int main() {").await;
    let addr = harness.serve_api().await;
    let http = reqwest::Client::new();
    let (mut client, _) = connected_client(addr).await;

    http.post(url(addr, "/api/compile"))
        .send()
        .await
        .expect("Request failed");
    events_until_notification(&mut client).await;

    http.post(url(addr, "/api/regenerate"))
        .send()
        .await
        .expect("Request failed");
    let events = events_until_notification(&mut client).await;

    match events.last().unwrap() {
        SessionEvent::Notification(payload) => {
            assert_eq!(payload.level, NotificationLevel::Error);
            assert_eq!(payload.message, REGEN_FAILURE_MESSAGE);
        }
        other => panic!("Expected Notification event, got: {other:?}"),
    }
    assert_eq!(
        harness.ai.regen_bodies()[0]["error"],
        "main.c:1: error: expected ';'"
    );

    let snapshot = get_snapshot(&http, addr).await;
    assert_eq!(snapshot.code, "int main() {");
    assert!(!snapshot.regenerating);
    assert!(snapshot.error_occurred);
}

#[tokio::test]
async fn test_regenerate_without_failure_returns_409() {
    let harness = Harness::start().await;
    let addr = harness.serve_api().await;

    let response = reqwest::Client::new()
        .post(url(addr, "/api/regenerate"))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 409);
    assert!(harness.ai.regen_bodies().is_empty());
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_applies_code_and_language() {
    let harness = Harness::start().await;
    harness.ai.answer_chat(json!({
        "chat": "Here it is in Go",
        "fixed_code": "package main\n\nfunc main() { println(5) }",
        "language": "go"
    }));
    let addr = harness.serve_api().await;
    let http = reqwest::Client::new();

    let started: Value = http
        .post(url(addr, "/api/chat"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .unwrap();
    assert_eq!(started["messages"].as_array().unwrap().len(), 2);

    let response = http
        .post(url(addr, "/api/chat/message"))
        .json(&json!({ "text": "rewrite this in go" }))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 200);
    let transcript: Value = response.json().await.unwrap();
    let messages = transcript["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[2]["speaker"], "user");
    assert_eq!(messages[3]["text"], "Here it is in Go");
    assert_eq!(messages[4]["step"], "followup");

    let bodies = harness.ai.chat_bodies();
    assert_eq!(bodies[0]["user"], "rewrite this in go");
    assert_eq!(bodies[0]["lang"], "JavaScript (Node.js 12.14.0)");
    assert!(bodies[0]["error"].is_null());

    let snapshot = get_snapshot(&http, addr).await;
    assert_eq!(snapshot.language.id, 60);
    assert!(snapshot.code.starts_with("package main"));
}

#[tokio::test]
async fn test_chat_malformed_answer_uses_fallback() {
    let harness = Harness::start().await;
    harness.ai.answer_chat(json!({ "reply": "wrong shape" }));
    let addr = harness.serve_api().await;
    let http = reqwest::Client::new();

    http.post(url(addr, "/api/chat"))
        .send()
        .await
        .expect("Request failed");
    let transcript: Value = http
        .post(url(addr, "/api/chat/message"))
        .json(&json!({ "text": "help" }))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .unwrap();

    assert_eq!(
        transcript["messages"][3]["text"],
        "Sorry, something went wrong. Please try again."
    );
    let snapshot = get_snapshot(&http, addr).await;
    assert_eq!(snapshot.language.id, 63);
}

#[tokio::test]
async fn test_chat_message_after_end_returns_409() {
    let harness = Harness::start().await;
    let addr = harness.serve_api().await;
    let http = reqwest::Client::new();

    http.post(url(addr, "/api/chat"))
        .send()
        .await
        .expect("Request failed");
    let response = http
        .delete(url(addr, "/api/chat"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 204);

    let response = http
        .post(url(addr, "/api/chat/message"))
        .json(&json!({ "text": "still there?" }))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 409);
    assert!(harness.ai.chat_bodies().is_empty());
}
