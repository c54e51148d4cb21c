//! Real-time chat gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) chat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound frame queue capacity per connection.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer_size: usize,
    /// Upper bound for a single write to one socket, in milliseconds.
    ///
    /// Applies both to enqueueing into the connection's outbound queue and
    /// to the socket write itself. A timed-out write marks the socket dead.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Maximum raw inbound frame size in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Maximum message content length in characters.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    /// Maximum simultaneous sockets per user; the oldest is evicted beyond this.
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
}

impl RealtimeConfig {
    /// Write timeout as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer_size: default_outbound_buffer(),
            write_timeout_ms: default_write_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
            max_message_chars: default_max_message_chars(),
            max_connections_per_user: default_max_connections_per_user(),
        }
    }
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_write_timeout() -> u64 {
    5_000
}

fn default_max_frame_bytes() -> usize {
    65_536
}

fn default_max_message_chars() -> usize {
    5_000
}

fn default_max_connections_per_user() -> usize {
    10
}
