use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use cortexluma::AppState;
use cortexluma::config::{AppConfig, ChatConfig, DEFAULT_WELCOME_MESSAGE, ServerConfig};
use cortexluma::llm::{LlmDriver, LlmError, ScriptedDriver, ScriptedReply, Transport, TransportMode};
use cortexluma::server::router;
use cortexluma::session::{Message, Sender, SessionView, WELCOME_MESSAGE_ID};
use serde_json::{Value, json};

fn test_config(mode: TransportMode) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        chat: ChatConfig {
            mode,
            system_instruction: None,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            append_error_message: true,
            session_idle_timeout_secs: 60,
        },
    })
}

fn test_app(driver: &Arc<ScriptedDriver>, mode: TransportMode) -> (TestServer, AppState) {
    let transport = Arc::new(Transport::with_driver(
        Arc::clone(driver) as Arc<dyn LlmDriver>,
        mode,
        None,
    ));
    let state = AppState::new(test_config(mode), transport, false);
    let server = TestServer::new(router(state.clone())).expect("Failed to start test server");
    (server, state)
}

/// Parse an SSE body into `(event name, data payload)` pairs.
fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut name = String::new();
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    name = rest.to_string();
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data.push_str(rest);
                }
            }
            let payload: Value = serde_json::from_str(&data).expect("invalid SSE payload");
            (name, payload)
        })
        .collect()
}

fn event_names(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}

#[tokio::test]
async fn test_index_renders_fresh_session_with_welcome() {
    let driver = Arc::new(ScriptedDriver::new());
    let (server, state) = test_app(&driver, TransportMode::Stream);

    let first = server.get("/").await;
    first.assert_status_ok();
    let html = first.text();
    assert!(html.contains("CortexLuma"));
    assert!(html.contains(WELCOME_MESSAGE_ID));
    assert!(html.contains(DEFAULT_WELCOME_MESSAGE));

    // Every page load gets its own session
    server.get("/").await.assert_status_ok();
    assert_eq!(state.sessions.len(), 2);
}

#[tokio::test]
async fn test_missing_credential_flag_reaches_page() {
    let driver = Arc::new(ScriptedDriver::new());
    let transport = Arc::new(Transport::with_driver(driver, TransportMode::Stream, None));
    let state = AppState::new(test_config(TransportMode::Stream), transport, true);
    let server = TestServer::new(router(state)).expect("Failed to start test server");

    let html = server.get("/").await.text();
    assert!(html.contains(r#"data-credential-missing="true""#));
}

#[tokio::test]
async fn test_health() {
    let driver = Arc::new(ScriptedDriver::new());
    let (server, _state) = test_app(&driver, TransportMode::Stream);

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_streamed_turn_events() {
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_fragments(["Why did ", "the chicken ", "cross the road?"]);
    let (server, state) = test_app(&driver, TransportMode::Stream);
    let session = state.sessions.create();

    let resp = server
        .post("/api/chat")
        .json(&json!({ "message": "Tell me a joke", "session_id": session.id() }))
        .await;
    resp.assert_status_ok();
    assert_eq!(
        resp.header("content-type").to_str().unwrap(),
        "text/event-stream"
    );

    let events = parse_sse(&resp.text());
    assert_eq!(
        event_names(&events),
        vec![
            "stream.start",
            "message.append",
            "loading",
            "message.append",
            "message.update",
            "message.update",
            "loading",
            "done",
        ]
    );
    assert_eq!(events[1].1["data"]["message"]["text"], "Tell me a joke");
    assert_eq!(events[3].1["data"]["message"]["text"], "Why did ");
    assert_eq!(events[4].1["data"]["text"], "Why did the chicken ");
    assert_eq!(
        events[5].1["data"]["text"],
        "Why did the chicken cross the road?"
    );

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].text, "Why did the chicken cross the road?");
}

#[tokio::test]
async fn test_chat_without_session_creates_one() {
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_fragments(["Hi there!"]);
    let (server, state) = test_app(&driver, TransportMode::Whole);

    let resp = server
        .post("/api/chat")
        .json(&json!({ "message": "Hello" }))
        .await;
    resp.assert_status_ok();

    let events = parse_sse(&resp.text());
    let session_id = events[0].1["data"]["session_id"]
        .as_str()
        .expect("stream.start carries the session id")
        .to_string();

    let view: SessionView = server
        .get(&format!("/api/sessions/{session_id}"))
        .await
        .json();
    assert_eq!(view.messages.len(), 3);
    assert_eq!(view.messages[1].text, "Hello");
    assert_eq!(view.messages[2].text, "Hi there!");
    assert!(!view.is_loading);
    assert_eq!(view.error, None);
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_failed_turn_reports_error() {
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_error(LlmError::network("connection refused"));
    let (server, state) = test_app(&driver, TransportMode::Stream);
    let session = state.sessions.create();

    let resp = server
        .post("/api/chat")
        .json(&json!({ "message": "Hello", "session_id": session.id() }))
        .await;
    resp.assert_status_ok();

    let events = parse_sse(&resp.text());
    let (_, error) = events
        .iter()
        .find(|(name, _)| name == "error")
        .expect("error event");
    assert_eq!(error["data"]["message"], "An error occurred. Please try again.");
    assert_eq!(error["data"]["code"], "network");

    let view = session.view();
    assert_eq!(view.messages.len(), 3);
    assert_eq!(view.messages[2].sender, Sender::Model);
    assert!(view.messages[2].id.as_str().starts_with("error-"));
    assert!(!view.is_loading);
    assert!(view.error.is_some());
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_one_model_entry() {
    let driver = Arc::new(ScriptedDriver::new());
    driver.push(ScriptedReply::FailAfter(
        vec!["partial ".to_string(), "answer".to_string()],
        LlmError::network("connection reset"),
    ));
    let (server, state) = test_app(&driver, TransportMode::Stream);
    let session = state.sessions.create();

    server
        .post("/api/chat")
        .json(&json!({ "message": "Hello", "session_id": session.id() }))
        .await
        .assert_status_ok();

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].sender, Sender::Model);
    assert_eq!(messages[2].text, "An error occurred. Please try again.");
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let driver = Arc::new(ScriptedDriver::new());
    let (server, state) = test_app(&driver, TransportMode::Stream);
    let session = state.sessions.create();

    let resp = server
        .post("/api/chat")
        .json(&json!({ "message": "   ", "session_id": session.id() }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(resp.json::<Value>()["error"].is_string());

    assert_eq!(session.message_count(), 1);
    assert!(driver.recorded_requests().is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let driver = Arc::new(ScriptedDriver::new());
    let (server, _state) = test_app(&driver, TransportMode::Stream);

    server
        .post("/api/chat")
        .json(&json!({ "message": "Hello", "session_id": "missing" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_swept_session_recovers_with_fresh_session() {
    let driver = Arc::new(ScriptedDriver::new());
    driver.push_fragments(["Hi again!"]);
    let (server, state) = test_app(&driver, TransportMode::Stream);

    server.get("/").await.assert_status_ok();
    let stale_id = state.sessions.list_ids().pop().expect("page created a session");

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(state.sessions.cleanup_expired_with_timeout(Duration::ZERO), 1);

    let resp = server
        .post("/api/chat")
        .json(&json!({ "message": "Hello", "session_id": stale_id }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert!(resp.json::<Value>()["error"].is_string());

    // The page drops its stale id and resends without one
    let resp = server
        .post("/api/chat")
        .json(&json!({ "message": "Hello", "session_id": null }))
        .await;
    resp.assert_status_ok();

    let events = parse_sse(&resp.text());
    let fresh_id = events[0].1["data"]["session_id"]
        .as_str()
        .expect("stream.start carries the session id");
    assert_ne!(fresh_id, stale_id);
    assert_eq!(state.sessions.list_ids(), vec![fresh_id.to_string()]);
    assert_eq!(state.sessions.get(fresh_id).unwrap().last().unwrap().text, "Hi again!");
}

#[tokio::test]
async fn test_busy_session_is_conflict() {
    let driver = Arc::new(ScriptedDriver::new());
    let (server, state) = test_app(&driver, TransportMode::Stream);
    let session = state.sessions.create();

    let guard = session.begin_send().expect("session should be idle");
    server
        .post("/api/chat")
        .json(&json!({ "message": "Hello", "session_id": session.id() }))
        .await
        .assert_status(StatusCode::CONFLICT);
    drop(guard);

    assert_eq!(session.message_count(), 1);
    assert!(driver.recorded_requests().is_empty());
}

#[tokio::test]
async fn test_session_endpoints() {
    let driver = Arc::new(ScriptedDriver::new());
    let (server, _state) = test_app(&driver, TransportMode::Stream);

    let created = server.post("/api/sessions").await;
    created.assert_status(StatusCode::CREATED);
    let view: SessionView = created.json();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].id.as_str(), WELCOME_MESSAGE_ID);

    let list: Vec<Value> = server.get("/api/sessions").await.json();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], view.id.as_str());
    assert_eq!(list[0]["message_count"], 1);

    let messages: Vec<Message> = server
        .get(&format!("/api/sessions/{}/messages", view.id))
        .await
        .json();
    assert_eq!(messages, view.messages);

    server
        .delete(&format!("/api/sessions/{}", view.id))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/sessions/{}", view.id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .delete(&format!("/api/sessions/{}", view.id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reading_the_view_does_not_mutate() {
    let driver = Arc::new(ScriptedDriver::new());
    let (server, state) = test_app(&driver, TransportMode::Stream);
    let session = state.sessions.create();

    let path = format!("/api/sessions/{}", session.id());
    let first: SessionView = server.get(&path).await.json();
    let second: SessionView = server.get(&path).await.json();
    assert_eq!(first, second);
    assert_eq!(session.message_count(), 1);
}
