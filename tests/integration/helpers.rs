//! Shared helpers for end-to-end tests against a live server.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use bazaar_api::{AppState, build_app};
use bazaar_auth::{JwtDecoder, JwtEncoder};
use bazaar_core::config::AppConfig;
use bazaar_core::types::{ListingId, UserId};
use bazaar_database::MemoryStore;
use bazaar_entity::Conversation;
use bazaar_realtime::RealtimeEngine;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// A server on an ephemeral port over an in-memory store.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<RealtimeEngine>,
    pub conversation: Conversation,
    encoder: JwtEncoder,
}

impl TestServer {
    pub async fn start() -> Self {
        let config = AppConfig::default();
        let store = Arc::new(MemoryStore::new());
        let conversation = Conversation::new(ListingId::new(), UserId::new(), UserId::new());
        store.insert_conversation(conversation.clone());

        let verifier = Arc::new(JwtDecoder::new(&config.auth));
        let engine = Arc::new(RealtimeEngine::new(
            config.realtime.clone(),
            verifier.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        let state = AppState {
            config: Arc::new(config.clone()),
            realtime: engine.clone(),
            verifier,
            conversations: store.clone(),
            messages: store.clone(),
            database: None,
            started_at: Instant::now(),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_app(state)).await.unwrap();
        });

        Self {
            addr,
            store,
            engine,
            conversation,
            encoder: JwtEncoder::new(&config.auth),
        }
    }

    pub fn token(&self, user: UserId) -> String {
        self.encoder.access_token(user).unwrap()
    }

    pub fn chat_url(&self, token: &str) -> String {
        format!(
            "ws://{}/chat/{}?token={}",
            self.addr, self.conversation.id, token
        )
    }

    /// Connects `user` and waits until the socket is active.
    pub async fn join(&self, user: UserId) -> ChatClient {
        let mut client = ChatClient::connect(&self.chat_url(&self.token(user))).await;
        client.send_json(serde_json::json!({ "type": "ping" })).await;
        client.expect_type("pong").await;
        client
    }
}

pub struct ChatClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ChatClient {
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.expect("upgrade failed");
        Self { ws }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.ws.send(Message::text(value.to_string())).await.unwrap();
    }

    pub async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
            .await
            .expect("timed out waiting for a frame")
            .map(|r| r.unwrap())
    }

    /// Skips frames until a text frame of type `kind` arrives.
    pub async fn expect_type(&mut self, kind: &str) -> Value {
        loop {
            match self.recv().await {
                Some(Message::Text(text)) => {
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                    if frame["type"] == kind {
                        return frame;
                    }
                }
                Some(_) => {}
                None => panic!("socket closed while waiting for {kind}"),
            }
        }
    }

    /// Waits for the server's close frame and returns its code.
    pub async fn expect_close(&mut self) -> u16 {
        loop {
            match self.recv().await {
                Some(Message::Close(Some(frame))) => return u16::from(frame.code),
                Some(Message::Close(None)) | None => panic!("closed without a close code"),
                Some(_) => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
