//! Message content kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a message's `content` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Image URL.
    Image,
    /// Document URL.
    Document,
    /// Server-generated notice; never accepted from clients.
    System,
}

impl MessageType {
    /// Return the type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::System => "system",
        }
    }

    /// Whether a client may send this type.
    pub fn is_client_sendable(&self) -> bool {
        !matches!(self, Self::System)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = bazaar_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            "system" => Ok(Self::System),
            _ => Err(bazaar_core::AppError::validation(format!(
                "Invalid message type: '{s}'. Expected one of: text, image, document"
            ))),
        }
    }
}
