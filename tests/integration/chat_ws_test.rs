//! End-to-end tests of the chat WebSocket endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

use std::time::Duration;

use serde_json::json;

use bazaar_core::types::UserId;
use bazaar_entity::MessageStatus;

use helpers::{ChatClient, TestServer};

#[tokio::test]
async fn test_conversation_round_trip() {
    let server = TestServer::start().await;
    let client = server.conversation.client_id;
    let owner = server.conversation.owner_id;

    let mut a = server.join(client).await;
    let mut b = server.join(owner).await;

    let online = a.expect_type("presence").await;
    assert_eq!(online["user_id"], owner.to_string());
    assert_eq!(online["is_online"], true);

    b.send_json(json!({ "type": "typing", "is_typing": true })).await;
    let typing = a.expect_type("typing").await;
    assert_eq!(typing["user_id"], owner.to_string());

    a.send_json(json!({ "type": "message", "content": "hello", "message_type": "text" })).await;
    let to_a = a.expect_type("message").await;
    let to_b = b.expect_type("message").await;
    assert_eq!(to_a["data"]["content"], "hello");
    assert_eq!(to_b["data"]["id"], to_a["data"]["id"]);

    b.send_json(json!({ "type": "read", "message_id": to_b["data"]["id"] })).await;
    let receipt = a.expect_type("read_receipt").await;
    assert_eq!(receipt["read_by"], owner.to_string());

    let stored = server.store.messages_in(server.conversation.id);
    assert_eq!(stored[0].status, MessageStatus::Read);

    b.close().await;
    let offline = a.expect_type("presence").await;
    assert_eq!(offline["user_id"], owner.to_string());
    assert_eq!(offline["is_online"], false);
}

#[tokio::test]
async fn test_malformed_frame_keeps_socket_open() {
    let server = TestServer::start().await;
    let mut a = server.join(server.conversation.client_id).await;

    a.send_json(json!("just a string")).await;
    let error = a.expect_type("error").await;
    assert!(error["message"].is_string());

    a.send_json(json!({ "type": "ping" })).await;
    a.expect_type("pong").await;
}

#[tokio::test]
async fn test_bad_token_closes_with_policy_violation() {
    let server = TestServer::start().await;
    let mut socket = ChatClient::connect(&server.chat_url("not-a-jwt")).await;
    assert_eq!(socket.expect_close().await, 1008);
    assert_eq!(server.engine.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_stranger_closes_with_policy_violation() {
    let server = TestServer::start().await;
    let token = server.token(UserId::new());
    let mut socket = ChatClient::connect(&server.chat_url(&token)).await;
    assert_eq!(socket.expect_close().await, 1008);
}

#[tokio::test]
async fn test_shutdown_sends_going_away() {
    let server = TestServer::start().await;
    let mut a = server.join(server.conversation.client_id).await;

    server.engine.shutdown(Duration::from_secs(1)).await;

    assert_eq!(a.expect_close().await, 1001);
    assert_eq!(server.engine.registry.connection_count(), 0);
}
