//! Individual WebSocket connection handle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use bazaar_core::types::{ConversationId, UserId};

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// WebSocket close codes used by the gateway.
pub mod close_code {
    /// Server is shutting down.
    pub const GOING_AWAY: u16 = 1001;
    /// Authentication or authorization failure, or connection limit.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Unhandled server-side failure.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// A frame queued for a socket's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Serialized JSON frame.
    Text(String),
    /// Close the socket with a code and reason; the writer stops after it.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Human-readable reason.
        reason: String,
    },
}

impl WireMessage {
    /// Build a close frame.
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }
}

/// A handle to a single authorized WebSocket connection.
///
/// Holds the sender side of the socket's outbound queue plus the user and
/// conversation the socket was opened for. Liveness is a cancellation
/// token: marking the handle dead wakes the connection's receive loop.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// User who owns this connection
    pub user_id: UserId,
    /// Conversation this connection was opened for
    pub conversation_id: ConversationId,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Sender for outbound frames
    sender: mpsc::Sender<WireMessage>,
    /// Cancelled once the connection is dead
    liveness: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(
        user_id: UserId,
        conversation_id: ConversationId,
        sender: mpsc::Sender<WireMessage>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            conversation_id,
            connected_at: Utc::now(),
            sender,
            liveness: CancellationToken::new(),
        }
    }

    /// Queue a frame for this connection, waiting at most `timeout` for
    /// room in the queue.
    ///
    /// Returns `false` when the frame could not be queued; a full queue
    /// past the timeout or a closed queue marks the connection dead.
    pub async fn send(&self, msg: WireMessage, timeout: Duration) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.send_timeout(msg, timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(conn_id = %self.id, "Outbound queue stalled, marking connection dead");
                self.mark_dead();
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        !self.liveness.is_cancelled()
    }

    /// Mark connection as dead
    pub fn mark_dead(&self) {
        self.liveness.cancel();
    }

    /// Resolves once the connection has been marked dead.
    pub fn dead(&self) -> WaitForCancellationFuture<'_> {
        self.liveness.cancelled()
    }

    /// Token shared with the connection's writer task.
    pub fn liveness_token(&self) -> CancellationToken {
        self.liveness.clone()
    }
}
