//! Router-level tests of the REST endpoints.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use bazaar_api::{AppState, build_app};
use bazaar_auth::{JwtDecoder, JwtEncoder};
use bazaar_core::config::AppConfig;
use bazaar_core::types::{ListingId, UserId};
use bazaar_database::MemoryStore;
use bazaar_entity::{Conversation, MessageStatus};
use bazaar_realtime::RealtimeEngine;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    encoder: JwtEncoder,
    conversation: Conversation,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::default();
        let store = Arc::new(MemoryStore::new());
        let conversation = Conversation::new(ListingId::new(), UserId::new(), UserId::new());
        store.insert_conversation(conversation.clone());

        let verifier = Arc::new(JwtDecoder::new(&config.auth));
        let engine = RealtimeEngine::new(
            config.realtime.clone(),
            verifier.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        let state = AppState {
            config: Arc::new(config.clone()),
            realtime: Arc::new(engine),
            verifier,
            conversations: store.clone(),
            messages: store.clone(),
            database: None,
            started_at: Instant::now(),
        };

        Self {
            router: build_app(state),
            store,
            encoder: JwtEncoder::new(&config.auth),
            conversation,
        }
    }

    fn token(&self, user: UserId) -> String {
        self.encoder.access_token(user).unwrap()
    }

    async fn request(&self, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn messages_uri(&self) -> String {
        format!("/api/conversations/{}/messages", self.conversation.id)
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.request("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_health_detailed_reports_memory_store() {
    let app = TestApp::new();
    let (status, body) = app.request("GET", "/api/health/detailed", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], "memory");
    assert_eq!(body["data"]["ws_connections"], 0);
}

#[tokio::test]
async fn test_send_message_persists() {
    let app = TestApp::new();
    let token = app.token(app.conversation.client_id);

    let (status, body) = app
        .request("POST", &app.messages_uri(), Some(json!({ "content": "is it still for sale?" })), Some(&token))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["content"], "is it still for sale?");
    assert_eq!(body["data"]["message_type"], "text");

    let stored = app.store.messages_in(app.conversation.id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, MessageStatus::Sent);
}

#[tokio::test]
async fn test_send_message_requires_token() {
    let app = TestApp::new();
    let (status, body) = app
        .request("POST", &app.messages_uri(), Some(json!({ "content": "hi" })), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _) = app
        .request("POST", &app.messages_uri(), Some(json!({ "content": "hi" })), Some("not-a-jwt"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_message_rejects_non_participant() {
    let app = TestApp::new();
    let token = app.token(UserId::new());
    let (status, _) = app
        .request("POST", &app.messages_uri(), Some(json!({ "content": "hi" })), Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.messages_in(app.conversation.id).is_empty());
}

#[tokio::test]
async fn test_send_message_validates_content() {
    let app = TestApp::new();
    let token = app.token(app.conversation.owner_id);

    let (status, body) = app
        .request("POST", &app.messages_uri(), Some(json!({ "content": "   " })), Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, _) = app
        .request(
            "POST",
            &app.messages_uri(),
            Some(json!({ "content": "sold", "message_type": "system" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.store.messages_in(app.conversation.id).is_empty());
}
