//! Per-connection protocol handler.
//!
//! Drives one socket from authentication to teardown. The handler does not
//! know about any WebSocket library: the transport adapts its socket into a
//! stream of [`TransportEvent`]s and a sink of [`WireMessage`]s.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bazaar_auth::TokenVerifier;
use bazaar_core::config::RealtimeConfig;
use bazaar_core::error::ErrorKind;
use bazaar_core::types::{ConversationId, MessageId, UserId};
use bazaar_database::{ConversationStore, MessageStore};
use bazaar_entity::MessageType;

use crate::broadcast::router::BroadcastRouter;
use crate::connection::handle::{ConnectionHandle, ConnectionId, WireMessage, close_code};
use crate::message::builder;
use crate::message::types::ClientFrame;
use crate::message::validator;

use super::error::FrameError;
use super::state::ConnectionState;

/// What the client asked for when opening the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Conversation from the URL path.
    pub conversation_id: ConversationId,
    /// Access token from the handshake, if any.
    pub token: Option<String>,
}

/// Inbound transport event, independent of the WebSocket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Transport-level ping or pong.
    Heartbeat,
    /// The peer sent a close frame.
    Close,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Closed before registration.
    Rejected {
        /// Close code sent to the client.
        code: u16,
        /// Close reason sent to the client.
        reason: String,
    },
    /// Was active and has been torn down.
    Closed {
        /// The connection.
        conn_id: ConnectionId,
        /// Its user.
        user_id: UserId,
        /// Text frames processed.
        frames_handled: u64,
    },
}

struct Rejection {
    code: u16,
    reason: &'static str,
}

impl Rejection {
    fn policy(reason: &'static str) -> Self {
        Self {
            code: close_code::POLICY_VIOLATION,
            reason,
        }
    }

    fn internal() -> Self {
        Self {
            code: close_code::INTERNAL_ERROR,
            reason: "Internal server error",
        }
    }
}

/// Runs the chat protocol for individual connections.
pub struct ProtocolHandler {
    router: Arc<BroadcastRouter>,
    verifier: Arc<dyn TokenVerifier>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    config: RealtimeConfig,
}

impl std::fmt::Debug for ProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}

impl ProtocolHandler {
    /// Creates a new handler.
    pub fn new(
        router: Arc<BroadcastRouter>,
        verifier: Arc<dyn TokenVerifier>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            router,
            verifier,
            conversations,
            messages,
            config,
        }
    }

    /// Serves one connection until it closes.
    ///
    /// Authentication and authorization failures close the socket before
    /// anything is registered. Once active, every exit path tears the
    /// connection down exactly once.
    pub async fn serve<St, E, Si>(
        &self,
        request: ConnectRequest,
        mut inbound: St,
        mut outbound: Si,
    ) -> SessionEnd
    where
        St: Stream<Item = Result<TransportEvent, E>> + Unpin + Send,
        E: Display + Send,
        Si: Sink<WireMessage> + Unpin + Send + 'static,
        Si::Error: Display,
    {
        let conversation_id = request.conversation_id;
        let mut state = ConnectionState::Connecting;

        state.advance(ConnectionState::Authenticating);
        let user_id = match self.authenticate(request.token.as_deref()).await {
            Ok(user_id) => user_id,
            Err(rejection) => return self.reject(&mut state, &mut outbound, rejection).await,
        };

        state.advance(ConnectionState::Authorizing);
        if let Err(rejection) = self.authorize(conversation_id, user_id).await {
            return self.reject(&mut state, &mut outbound, rejection).await;
        }

        let write_timeout = self.config.write_timeout();
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer_size.max(1));
        let handle = Arc::new(ConnectionHandle::new(user_id, conversation_id, tx));
        let conn_id = handle.id;
        let writer = tokio::spawn(write_loop(
            rx,
            outbound,
            handle.liveness_token(),
            write_timeout,
            conn_id,
        ));

        if self.router.attach(Arc::clone(&handle)).await.is_err() {
            let rejection = Rejection::internal();
            handle
                .send(WireMessage::close(rejection.code, rejection.reason), write_timeout)
                .await;
            state.advance(ConnectionState::Closing);
            finish_writer(handle, writer, write_timeout).await;
            state.advance(ConnectionState::Closed);
            self.router.metrics().connection_rejected();
            return SessionEnd::Rejected {
                code: rejection.code,
                reason: rejection.reason.to_string(),
            };
        }

        state.advance(ConnectionState::Active);
        let guard = TeardownGuard {
            router: Arc::clone(&self.router),
            conn_id,
        };

        let frames_handled = self.receive_loop(&handle, &mut inbound).await;

        state.advance(ConnectionState::Closing);
        // Commit the disconnect and hand its follow-up to a task before the
        // guard is disarmed, so cancelling `serve` cannot drop the settle.
        let departure = self.router.registry().disconnect(conn_id);
        drop(guard);
        if let Some(departure) = departure {
            let router = Arc::clone(&self.router);
            if let Err(e) = tokio::spawn(async move { router.settle(departure).await }).await {
                error!(conn_id = %conn_id, error = %e, "Connection teardown task failed");
            }
        }
        finish_writer(handle, writer, write_timeout).await;
        state.advance(ConnectionState::Closed);

        info!(
            conn_id = %conn_id,
            user_id = %user_id,
            conversation_id = %conversation_id,
            frames_handled,
            "Chat connection closed"
        );

        SessionEnd::Closed {
            conn_id,
            user_id,
            frames_handled,
        }
    }

    async fn authenticate(&self, token: Option<&str>) -> Result<UserId, Rejection> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            debug!("Chat connection without token");
            return Err(Rejection::policy("Missing token"));
        };

        match self.verifier.verify_token(token).await {
            Ok(user_id) => Ok(user_id),
            Err(e) if e.kind == ErrorKind::Unauthorized => {
                debug!(error = %e, "Chat token rejected");
                Err(Rejection::policy("Authentication failed"))
            }
            Err(e) => {
                error!(error = %e, "Token verification failed");
                Err(Rejection::internal())
            }
        }
    }

    async fn authorize(&self, conversation_id: ConversationId, user_id: UserId) -> Result<(), Rejection> {
        match self.conversations.get_conversation(conversation_id, user_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                debug!(
                    user_id = %user_id,
                    conversation_id = %conversation_id,
                    "Conversation access denied"
                );
                Err(Rejection::policy("Access denied"))
            }
            Err(e) => {
                error!(
                    user_id = %user_id,
                    conversation_id = %conversation_id,
                    error = %e,
                    "Conversation lookup failed"
                );
                Err(Rejection::internal())
            }
        }
    }

    async fn reject<Si>(&self, state: &mut ConnectionState, outbound: &mut Si, rejection: Rejection) -> SessionEnd
    where
        Si: Sink<WireMessage> + Unpin + Send,
        Si::Error: Display,
    {
        state.advance(ConnectionState::Closing);
        self.router.metrics().connection_rejected();

        let timeout = self.config.write_timeout();
        let close = WireMessage::close(rejection.code, rejection.reason);
        match tokio::time::timeout(timeout, outbound.send(close)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Failed to send close frame"),
            Err(_) => debug!("Timed out sending close frame"),
        }
        let _ = tokio::time::timeout(timeout, outbound.close()).await;

        state.advance(ConnectionState::Closed);
        SessionEnd::Rejected {
            code: rejection.code,
            reason: rejection.reason.to_string(),
        }
    }

    async fn receive_loop<St, E>(&self, handle: &Arc<ConnectionHandle>, inbound: &mut St) -> u64
    where
        St: Stream<Item = Result<TransportEvent, E>> + Unpin + Send,
        E: Display + Send,
    {
        let mut frames_handled = 0u64;

        loop {
            let event = tokio::select! {
                biased;
                _ = handle.dead() => {
                    debug!(conn_id = %handle.id, "Connection marked dead");
                    break;
                }
                event = inbound.next() => event,
            };

            let result = match event {
                None | Some(Ok(TransportEvent::Close)) => break,
                Some(Err(e)) => {
                    debug!(conn_id = %handle.id, error = %e, "Transport error");
                    break;
                }
                Some(Ok(TransportEvent::Heartbeat)) => continue,
                Some(Ok(TransportEvent::Binary(_))) => {
                    Err(FrameError::Protocol("Binary frames are not supported".to_string()))
                }
                Some(Ok(TransportEvent::Text(text))) => {
                    frames_handled += 1;
                    self.router.metrics().frame_received();
                    self.handle_frame(handle, &text).await
                }
            };

            match result {
                Ok(()) => {}
                Err(FrameError::Disconnected) => break,
                Err(e) => {
                    match &e {
                        FrameError::Store(err) => {
                            warn!(conn_id = %handle.id, error = %err, "Store call failed")
                        }
                        _ => debug!(conn_id = %handle.id, error = %e, "Rejected frame"),
                    }
                    self.router.metrics().protocol_error();
                    let frame = builder::build_error(e.client_message());
                    if !self.router.send_to_connection(handle, &frame).await {
                        break;
                    }
                }
            }
        }

        frames_handled
    }

    /// Handles one inbound text frame.
    async fn handle_frame(&self, handle: &Arc<ConnectionHandle>, raw: &str) -> Result<(), FrameError> {
        validator::validate_frame_size(raw, self.config.max_frame_bytes)
            .map_err(|e| FrameError::Protocol(e.message))?;

        match ClientFrame::parse(raw)? {
            ClientFrame::Message {
                content,
                message_type,
            } => self.on_message(handle, &content, message_type).await,
            ClientFrame::Typing { is_typing } => {
                self.router
                    .broadcast_typing(handle.conversation_id, handle.user_id, is_typing)
                    .await;
                Ok(())
            }
            ClientFrame::Read { message_id } => self.on_read(handle, &message_id).await,
            ClientFrame::Ping => {
                if self.router.send_to_connection(handle, &builder::build_pong()).await {
                    Ok(())
                } else {
                    Err(FrameError::Disconnected)
                }
            }
        }
    }

    async fn on_message(
        &self,
        handle: &Arc<ConnectionHandle>,
        content: &str,
        message_type: MessageType,
    ) -> Result<(), FrameError> {
        let content =
            validator::validate_message_content(content, message_type, self.config.max_message_chars)
                .map_err(|e| FrameError::Protocol(e.message))?;

        let message = self
            .messages
            .create_message(handle.conversation_id, handle.user_id, content, message_type)
            .await?;
        self.router.metrics().message_persisted();

        let delivered = self.router.broadcast_message(&message).await;
        if delivered > 0 {
            if let Err(e) = self.messages.mark_as_delivered(message.id).await {
                warn!(message_id = %message.id, error = %e, "Failed to mark message delivered");
            }
        }

        debug!(
            conn_id = %handle.id,
            message_id = %message.id,
            delivered,
            "Chat message sent"
        );
        Ok(())
    }

    /// Marks a message read and announces the receipt to the conversation.
    ///
    /// A reader marking their own message produces no receipt: the sender
    /// learns nothing from it.
    async fn on_read(&self, handle: &Arc<ConnectionHandle>, raw_id: &str) -> Result<(), FrameError> {
        let message_id: MessageId = raw_id
            .parse()
            .map_err(|_| FrameError::Protocol("Invalid message_id".to_string()))?;

        let message = self.messages.mark_as_read(message_id, handle.user_id).await?;

        if message.sender_user_id != handle.user_id {
            self.router
                .broadcast_read_receipt(
                    message.conversation_id,
                    message.id,
                    handle.user_id,
                    message.read_at.unwrap_or_else(Utc::now),
                )
                .await;
        }
        Ok(())
    }
}

/// Forwards queued frames to the socket.
///
/// Each write is bounded by `timeout`; a failed or timed-out write marks
/// the connection dead. After the connection is marked dead, frames that
/// are already queued are still flushed. Stops after writing a close frame.
async fn write_loop<Si>(
    mut rx: mpsc::Receiver<WireMessage>,
    mut sink: Si,
    liveness: CancellationToken,
    timeout: Duration,
    conn_id: ConnectionId,
) where
    Si: Sink<WireMessage> + Unpin + Send + 'static,
    Si::Error: Display,
{
    loop {
        let msg = tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = liveness.cancelled() => match rx.try_recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };

        let closing = matches!(msg, WireMessage::Close { .. });
        match tokio::time::timeout(timeout, sink.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "Socket write failed");
                liveness.cancel();
                break;
            }
            Err(_) => {
                warn!(conn_id = %conn_id, "Socket write timed out");
                liveness.cancel();
                break;
            }
        }

        if closing {
            liveness.cancel();
            break;
        }
    }

    let _ = tokio::time::timeout(timeout, sink.close()).await;
}

/// Drops the connection's last sender and waits for its writer to drain.
async fn finish_writer(
    handle: Arc<ConnectionHandle>,
    mut writer: tokio::task::JoinHandle<()>,
    write_timeout: Duration,
) {
    handle.mark_dead();
    drop(handle);
    if tokio::time::timeout(write_timeout * 2, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Runs teardown if the connection task ends without reaching it,
/// e.g. on panic or when the task is cancelled.
struct TeardownGuard {
    router: Arc<BroadcastRouter>,
    conn_id: ConnectionId,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(departure) = self.router.registry().disconnect(self.conn_id) else {
            return;
        };

        warn!(conn_id = %self.conn_id, "Connection task ended without teardown");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let router = Arc::clone(&self.router);
                runtime.spawn(async move { router.settle(departure).await });
            }
            Err(_) => {
                error!(conn_id = %self.conn_id, "No runtime to finish connection teardown");
            }
        }
    }
}
