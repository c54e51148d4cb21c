//! Shared harness for driving the protocol handler over in-memory channels.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use bazaar_auth::TokenVerifier;
use bazaar_core::config::RealtimeConfig;
use bazaar_core::types::{ConversationId, ListingId, MessageId, UserId};
use bazaar_core::{AppError, AppResult};
use bazaar_database::{MemoryStore, MessageStore, PresenceStore};
use bazaar_entity::{Conversation, Message, MessageType};
use bazaar_realtime::{ConnectRequest, RealtimeEngine, SessionEnd, TransportEvent, WireMessage};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE: Duration = Duration::from_millis(150);

/// Accepts a user id as the token. `"boom"` simulates an auth backend outage.
pub struct UserIdVerifier;

#[async_trait]
impl TokenVerifier for UserIdVerifier {
    async fn verify_token(&self, token: &str) -> AppResult<UserId> {
        if token == "boom" {
            return Err(AppError::service_unavailable("auth backend down"));
        }
        token
            .parse()
            .map_err(|_| AppError::unauthorized("Invalid token"))
    }
}

/// Message store whose writes always fail.
pub struct FailingMessageStore;

#[async_trait]
impl MessageStore for FailingMessageStore {
    async fn create_message(
        &self,
        _conversation_id: ConversationId,
        _sender_id: UserId,
        _content: &str,
        _message_type: MessageType,
    ) -> AppResult<Message> {
        Err(AppError::database("insert failed"))
    }

    async fn mark_as_read(&self, _message_id: MessageId, _reader_id: UserId) -> AppResult<Message> {
        Err(AppError::database("update failed"))
    }

    async fn mark_as_delivered(&self, _message_id: MessageId) -> AppResult<()> {
        Err(AppError::database("update failed"))
    }
}

/// Presence store over a [`MemoryStore`] that can refuse new connections
/// and can be slow to record disconnects.
pub struct ScriptedPresenceStore {
    inner: Arc<MemoryStore>,
    refuse_connects: AtomicBool,
    disconnect_delay: Duration,
}

impl ScriptedPresenceStore {
    pub fn new(inner: Arc<MemoryStore>, disconnect_delay: Duration) -> Self {
        Self {
            inner,
            refuse_connects: AtomicBool::new(false),
            disconnect_delay,
        }
    }

    pub fn refuse_connects(&self, refuse: bool) {
        self.refuse_connects.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl PresenceStore for ScriptedPresenceStore {
    async fn update_presence(&self, user_id: UserId, is_online: bool, delta: i32) -> AppResult<()> {
        if delta > 0 && self.refuse_connects.load(Ordering::SeqCst) {
            return Err(AppError::database("presence upsert failed"));
        }
        if delta < 0 {
            tokio::time::sleep(self.disconnect_delay).await;
        }
        self.inner.update_presence(user_id, is_online, delta).await
    }
}

/// An engine over an in-memory store with one conversation between a
/// client and a listing owner.
pub struct TestChat {
    pub engine: RealtimeEngine,
    pub store: Arc<MemoryStore>,
    pub conversation: Conversation,
}

impl TestChat {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(store.clone(), store.clone(), store)
    }

    pub fn with_message_store(messages: Arc<dyn MessageStore>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(store.clone(), messages, store)
    }

    /// `store` holds the conversation; messages and presence may be
    /// served by other implementations.
    pub fn with_stores(
        store: Arc<MemoryStore>,
        messages: Arc<dyn MessageStore>,
        presence: Arc<dyn PresenceStore>,
    ) -> Self {
        let conversation = Conversation::new(ListingId::new(), UserId::new(), UserId::new());
        store.insert_conversation(conversation.clone());

        let config = RealtimeConfig {
            write_timeout_ms: 200,
            ..RealtimeConfig::default()
        };
        let engine = RealtimeEngine::new(
            config,
            Arc::new(UserIdVerifier),
            store.clone(),
            messages,
            presence,
        );

        Self {
            engine,
            store,
            conversation,
        }
    }

    pub fn client(&self) -> UserId {
        self.conversation.client_id
    }

    pub fn owner(&self) -> UserId {
        self.conversation.owner_id
    }

    /// Opens a socket without waiting for it to become active.
    pub fn open(&self, conversation_id: ConversationId, token: Option<String>) -> TestSocket {
        let (in_tx, in_rx) = mpsc::unbounded::<Result<TransportEvent, Infallible>>();
        let (out_tx, out_rx) = mpsc::unbounded::<WireMessage>();
        let handler = self.engine.handler.clone();
        let request = ConnectRequest {
            conversation_id,
            token,
        };
        let task = tokio::spawn(async move { handler.serve(request, in_rx, out_tx).await });

        TestSocket {
            inbound: in_tx,
            outbound: out_rx,
            task,
        }
    }

    /// Opens a socket for `user` on the test conversation and waits until
    /// it is active.
    pub async fn join(&self, user: UserId) -> TestSocket {
        let mut socket = self.open(self.conversation.id, Some(user.to_string()));
        socket.send_json(serde_json::json!({ "type": "ping" }));
        socket.expect_type("pong").await;
        socket
    }
}

pub struct TestSocket {
    inbound: mpsc::UnboundedSender<Result<TransportEvent, Infallible>>,
    outbound: mpsc::UnboundedReceiver<WireMessage>,
    task: JoinHandle<SessionEnd>,
}

impl TestSocket {
    pub fn send_text(&self, text: &str) {
        self.inbound
            .unbounded_send(Ok(TransportEvent::Text(text.to_string())))
            .unwrap();
    }

    pub fn send_binary(&self, data: &[u8]) {
        self.inbound
            .unbounded_send(Ok(TransportEvent::Binary(data.to_vec())))
            .unwrap();
    }

    /// Peer close without waiting for the session to end.
    pub fn hang_up(&self) {
        let _ = self.inbound.unbounded_send(Ok(TransportEvent::Close));
    }

    /// Cancels the server side of the session, as a runtime shutdown would.
    pub fn abort(self) {
        self.task.abort();
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    /// Next outbound wire message.
    pub async fn recv(&mut self) -> WireMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
    }

    /// Next JSON frame.
    pub async fn recv_json(&mut self) -> Value {
        match self.recv().await {
            WireMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Skips frames until one of type `kind` arrives.
    pub async fn expect_type(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.recv_json().await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    /// Every frame that arrives before the socket goes quiet.
    pub async fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(Some(msg)) = tokio::time::timeout(SILENCE, self.outbound.next()).await {
            if let WireMessage::Text(text) = msg {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    /// Peer-initiated close; returns how the session ended.
    pub async fn close(self) -> SessionEnd {
        let _ = self.inbound.unbounded_send(Ok(TransportEvent::Close));
        self.finish().await
    }

    /// Waits for the server side of the session to end.
    pub async fn finish(self) -> SessionEnd {
        tokio::time::timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("session did not end")
            .unwrap()
    }

    /// Waits for the close frame the server sent.
    pub async fn expect_close(&mut self) -> (u16, String) {
        loop {
            if let WireMessage::Close { code, reason } = self.recv().await {
                return (code, reason);
            }
        }
    }
}
