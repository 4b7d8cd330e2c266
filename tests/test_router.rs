//! Router-level tests: validation, auth, request ids and the chat stream
//! against a mock provider.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chat_sse_gateway::core::config::{ApiKeyConfig, AuthMode};
use chat_sse_gateway::core::{ErrorCode, ErrorResponse};
use chat_sse_gateway::services::TITLE_MAX_TOKENS;
use chat_sse_gateway::{build_router, AppConfig, AppState, StreamCancelHandle};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.openai.api_key = "sk-test".to_string();
    config.openai.base_url = base_url.to_string();
    config.openai.max_retries = 1;
    config
}

fn router(config: AppConfig) -> Router {
    build_router(Arc::new(
        AppState::new(config, StreamCancelHandle::new()).unwrap(),
    ))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn chat_body(agent: Option<&str>) -> Value {
    let mut body = json!({
        "model": "openai/gpt-4o-mini",
        "messages": [
            {"id": "m1", "role": "user", "parts": [
                {"type": "step-start"},
                {"type": "text", "text": "Hi"}
            ]}
        ]
    });
    if let Some(agent) = agent {
        body["agent"] = json!(agent);
    }
    body
}

async fn error_body(response: axum::response::Response) -> ErrorResponse {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn sse_frames(response: axum::response::Response) -> Vec<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    text.split("\n\n")
        .filter(|f| !f.is_empty())
        .map(|f| {
            let data = f.strip_prefix("data: ").unwrap();
            if data == "[DONE]" {
                Value::String("[DONE]".into())
            } else {
                serde_json::from_str(data).unwrap()
            }
        })
        .collect()
}

fn frame_types(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| match f {
            Value::String(s) => s.clone(),
            other => other["type"].as_str().unwrap().to_string(),
        })
        .collect()
}

async fn mock_provider_streaming(chunks: &[Value]) -> MockServer {
    let server = MockServer::start().await;
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_chat_empty_messages_is_400() {
    let app = router(config("http://127.0.0.1:1"));
    let response = app
        .oneshot(post_json("/chat", json!({"model": "gpt-4o", "messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(body.detail, "Messages array cannot be empty");
    assert_eq!(body.code, ErrorCode::InvalidRequest);
    assert!(body.request_id.is_some());
}

#[tokio::test]
async fn test_chat_malformed_body_is_422() {
    let app = router(config("http://127.0.0.1:1"));
    let response = app
        .oneshot(post_json("/chat", json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_body(response).await.code, ErrorCode::ValidationError);
}

#[tokio::test]
async fn test_chat_retained_part_schema_failure_is_422() {
    let app = router(config("http://127.0.0.1:1"));
    let body = json!({
        "model": "gpt-4o",
        "messages": [{"id": "m1", "role": "user", "parts": [{"type": "tool-call"}]}]
    });
    let response = app.oneshot(post_json("/chat", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_chat_streams_provider_text() {
    let server = mock_provider_streaming(&[
        json!({"choices": [{"delta": {"content": "Hel"}}]}),
        json!({"choices": [{"delta": {"content": "lo"}}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
    ])
    .await;

    let response = router(config(&server.uri()))
        .oneshot(post_json("/chat", chat_body(None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()["x-vercel-ai-ui-message-stream"], "v1");
    assert!(response.headers().contains_key("x-request-id"));

    let frames = sse_frames(response).await;
    assert_eq!(
        frame_types(&frames),
        vec![
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-delta",
            "text-end",
            "finish-step",
            "finish",
            "[DONE]"
        ]
    );

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "gpt-4o-mini");
    assert_eq!(sent["stream"], true);
}

#[tokio::test]
async fn test_chat_without_tools_sends_no_tool_definitions() {
    let server = mock_provider_streaming(&[
        json!({"choices": [{"delta": {"content": "Hi"}}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
    ])
    .await;

    let response = router(config(&server.uri()))
        .oneshot(post_json("/chat", chat_body(None)))
        .await
        .unwrap();
    sse_frames(response).await;

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(sent.get("tools").is_none(), "unexpected tools: {}", sent["tools"]);
}

#[tokio::test]
async fn test_chat_offers_only_requested_tools() {
    let server = mock_provider_streaming(&[
        json!({"choices": [{"delta": {"content": "Hi"}}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
    ])
    .await;

    let mut body = chat_body(None);
    body["tools"] = json!(["generateChart", "launchRocket"]);
    let response = router(config(&server.uri()))
        .oneshot(post_json("/chat", body))
        .await
        .unwrap();
    sse_frames(response).await;

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let names: Vec<&str> = sent["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["function"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["generateChart"]);
}

#[tokio::test]
async fn test_chat_unknown_agent_is_error_frame() {
    let app = router(config("http://127.0.0.1:1"));
    let response = app
        .oneshot(post_json("/chat", chat_body(Some("nope"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let frames = sse_frames(response).await;
    assert_eq!(frame_types(&frames), vec!["start", "start-step", "error", "[DONE]"]);
    assert_eq!(
        frames[2]["errorText"],
        "Unknown agent: 'nope'. Available agents: code_review, main, research"
    );
}

#[tokio::test]
async fn test_chat_provider_auth_failure_is_error_frame() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Incorrect API key sk-test"}})),
        )
        .mount(&server)
        .await;

    let response = router(config(&server.uri()))
        .oneshot(post_json("/chat", chat_body(None)))
        .await
        .unwrap();

    let frames = sse_frames(response).await;
    assert_eq!(frame_types(&frames), vec!["start", "start-step", "error", "[DONE]"]);
    assert_eq!(frames[2]["errorText"], ErrorCode::AuthInvalid.user_message());
}

#[tokio::test]
async fn test_api_key_auth() {
    let mut cfg = config("http://127.0.0.1:1");
    cfg.auth.mode = AuthMode::ApiKey;
    cfg.auth.api_keys.push(ApiKeyConfig {
        key: "secret".to_string(),
        name: "web".to_string(),
    });
    let app = router(cfg);

    let missing = app
        .clone()
        .oneshot(Request::get("/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(missing).await.code, ErrorCode::AuthRequired);

    let wrong = app
        .clone()
        .oneshot(
            Request::get("/models")
                .header("x-api-key", "guess")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(wrong).await.code, ErrorCode::AuthInvalid);

    let ok = app
        .clone()
        .oneshot(
            Request::get("/models")
                .header(header::AUTHORIZATION, "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let live = app
        .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(live.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_reused_when_valid() {
    let app = router(config("http://127.0.0.1:1"));
    let id = "3f2b8c1e-8d4a-4c5e-9f7a-1b2c3d4e5f60";

    let response = app
        .clone()
        .oneshot(
            Request::get("/health/live")
                .header("x-request-id", id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], id);

    let response = app
        .oneshot(
            Request::get("/health/live")
                .header("x-request-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert_ne!(generated, "not-a-uuid");
    assert!(uuid_like(generated));
}

fn uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn test_models_endpoint() {
    let response = router(config("http://127.0.0.1:1"))
        .oneshot(Request::get("/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["models"][0]["id"], "openai/gpt-4o");
    assert_eq!(body["models"][0]["context_window"], 128000);
}

#[tokio::test]
async fn test_title_generation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "\"Rust ownership basics\""},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let response = router(config(&server.uri()))
        .oneshot(post_json(
            "/title/generate",
            json!({"userMessage": "How does ownership work?", "conversationId": "c1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"title": "Rust ownership basics", "useFallback": false}));

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "gpt-4o-mini");
    assert_eq!(sent["max_tokens"], TITLE_MAX_TOKENS);
    assert!(sent.get("tools").is_none());
}

#[tokio::test]
async fn test_title_provider_failure_falls_back() {
    let response = router(config("http://127.0.0.1:1"))
        .oneshot(post_json(
            "/title/generate",
            json!({"userMessage": "hello", "conversationId": "c1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"title": "", "useFallback": true}));
}

#[tokio::test]
async fn test_title_validation_is_422() {
    let response = router(config("http://127.0.0.1:1"))
        .oneshot(post_json(
            "/title/generate",
            json!({"userMessage": "", "conversationId": "c1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let response = router(config("http://127.0.0.1:1"))
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/chat")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
}
