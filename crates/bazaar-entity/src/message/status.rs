//! Message delivery status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Delivery status of a message.
///
/// Ordered `Sent < Delivered < Read`; a status never moves backwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Persisted by the store.
    #[default]
    Sent,
    /// Reached at least one socket of the recipient.
    Delivered,
    /// Explicitly read by the recipient.
    Read,
}

impl MessageStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    /// Move forward to `next`. Returns `false` (and leaves `self` alone)
    /// when `next` would not be an advance.
    pub fn advance(&mut self, next: MessageStatus) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
