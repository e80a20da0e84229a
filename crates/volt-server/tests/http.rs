use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use volt_core::{ChatRelay, ConversationSource};
use volt_memory::{KvBackend, MemoryStore, NullBackend};
use volt_provider::StubProvider;
use volt_schema::KvEntry;
use volt_server::{create_router, AppState};

struct BrokenBackend;

#[async_trait]
impl KvBackend for BrokenBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("backend offline"))
    }

    async fn set(&self, _key: &str, _value: &str, _metadata: Option<Value>) -> Result<()> {
        Err(anyhow!("backend offline"))
    }

    async fn list(&self) -> Result<Vec<KvEntry>> {
        Err(anyhow!("backend offline"))
    }
}

fn app_with(relay: ChatRelay, backend: Arc<dyn KvBackend>, source: ConversationSource) -> Router {
    create_router(AppState::new(relay, MemoryStore::new(backend), source))
}

fn echo_app() -> Router {
    app_with(
        ChatRelay::echo(),
        Arc::new(NullBackend::new()),
        ConversationSource::None,
    )
}

async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn write_export(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("conversations.json");
    std::fs::write(
        &path,
        json!([
            {"id": 1, "title": "Hoodie colours", "messages": [
                {"role": "user", "content": "pink or peach?", "ts": 1700000000}
            ]},
            {"id": "trip", "title": "Travel", "messages": [
                {"role": "user", "content": "Book flights to Phuket", "ts": 1700000100},
                {"role": "assistant", "content": "On it", "ts": 1700000200}
            ]}
        ])
        .to_string(),
    )
    .unwrap();
    path
}

#[tokio::test]
async fn ping_answers_pong() {
    let (status, body) = send(echo_app(), Method::GET, "/api/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["msg"], "pong");
    assert!(body["time"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn chat_without_provider_echoes() {
    let (status, body) = send(
        echo_app(),
        Method::POST,
        "/api/chat",
        Some(r#"{"message": "hi", "conversationId": "abc"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "echo");
    assert_eq!(body["model"], "echo-mode");
    assert_eq!(body["conversationId"], "abc");
}

#[tokio::test]
async fn ask_and_conversations_chat_share_the_relay() {
    let app = app_with(
        ChatRelay::new(Some(Arc::new(StubProvider)), "stub-model"),
        Arc::new(NullBackend::new()),
        ConversationSource::None,
    );

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/ask",
        Some(r#"{"message": "one"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["response"], "[stub:stub-model] one");
    assert!(body.get("conversationId").is_none());

    let (status, body) = send(
        app,
        Method::POST,
        "/api/conversations?action=chat",
        Some(r#"{"messages": [{"role": "system", "content": "s"}, {"role": "user", "content": "two"}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "[stub:stub-model] two");
}

#[tokio::test]
async fn blank_chat_message_is_a_400() {
    for payload in [r#"{"message": "  "}"#, "{}", ""] {
        let (status, body) = send(echo_app(), Method::POST, "/api/chat", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Message is required");
    }
}

#[tokio::test]
async fn malformed_chat_body_is_a_400() {
    let (status, body) = send(echo_app(), Method::POST, "/api/chat", Some("{oops")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn memory_save_then_read_back() {
    let app = echo_app();

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/memory",
        Some(r#"{"type": "context", "content": "hello"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Saved successfully");
    assert!(body["data"]["key"].as_str().unwrap().starts_with("context/"));

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/memory",
        Some(r#"{"type": "conversation", "title": "My Trip!", "content": "beach", "tags": ["travel"]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["key"]
        .as_str()
        .unwrap()
        .ends_with("-my-trip.json"));

    let (_, body) = send(
        app.clone(),
        Method::GET,
        "/api/memory?action=latest-context",
        None,
    )
    .await;
    assert_eq!(body["data"]["type"], "context");
    assert_eq!(body["data"]["content"], "hello");

    let (_, body) = send(app.clone(), Method::GET, "/api/memory", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (_, body) = send(app, Method::GET, "/api/memory?action=generate-context", None).await;
    let context = body["data"]["context"].as_str().unwrap();
    assert!(context.contains("hello"));
    assert!(context.contains("My Trip!"));
}

#[tokio::test]
async fn latest_context_is_null_when_nothing_saved() {
    let (status, body) = send(
        echo_app(),
        Method::GET,
        "/api/memory?action=latest-context",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn memory_rejects_unknown_type_action_and_blank_content() {
    let (status, body) = send(
        echo_app(),
        Method::POST,
        "/api/memory",
        Some(r#"{"type": "memory-bank", "content": "x"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Unknown type: memory-bank");

    let (status, body) = send(echo_app(), Method::GET, "/api/memory?action=purge", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Unknown action: purge");

    let (status, body) = send(
        echo_app(),
        Method::POST,
        "/api/memory",
        Some(r#"{"type": "context", "content": ""}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn store_failure_is_a_500_with_backend_message() {
    let app = app_with(
        ChatRelay::echo(),
        Arc::new(BrokenBackend),
        ConversationSource::None,
    );
    let (status, body) = send(
        app,
        Method::POST,
        "/api/memory",
        Some(r#"{"type": "context", "content": "x"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("backend offline"));
}

#[tokio::test]
async fn conversations_without_source_serve_sample() {
    let (status, body) = send(echo_app(), Method::GET, "/api/conversations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["sample"], true);
    assert_eq!(body["conversations"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn conversations_lookup_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let source = ConversationSource::File(write_export(&dir));
    let app = app_with(ChatRelay::echo(), Arc::new(NullBackend::new()), source);

    let (status, body) = send(app.clone(), Method::GET, "/api/conversations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("sample").is_none());
    assert_eq!(body["conversations"].as_array().unwrap().len(), 2);

    let (_, body) = send(app.clone(), Method::GET, "/api/conversations?q=PHUKET", None).await;
    let hits = body["conversations"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], "trip");
    assert_eq!(hits[0]["title"], "Travel");
    assert_eq!(hits[0]["count"], 2);
    assert!(hits[0]["created"].is_i64());

    let (status, body) = send(app.clone(), Method::GET, "/api/conversations?id=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["thread"]["title"], "Hoodie colours");
    assert_eq!(body["thread"]["messages"][0]["ts"], 1700000000000_i64);

    let (status, body) = send(app, Method::GET, "/api/conversations?id=404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"ok": false, "error": "not_found"}));
}

#[tokio::test]
async fn normalize_endpoint_reports_shape() {
    let (status, body) = send(
        echo_app(),
        Method::POST,
        "/api/conversations?action=normalize",
        Some("{\"id\": \"a\", \"messages\": []}\n{\"id\": \"b\", \"messages\": []}\n"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["shape"], "ndjson");
    assert_eq!(body["conversations"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        echo_app(),
        Method::POST,
        "/api/conversations?action=normalize",
        Some("not json at all"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "parse_error");
}

#[tokio::test]
async fn preflight_is_answered_with_cors_headers() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/chat")
        .header("origin", "https://volt.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = echo_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}
