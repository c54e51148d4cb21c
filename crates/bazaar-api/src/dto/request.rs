//! Request DTOs.

use serde::Deserialize;

use bazaar_entity::MessageType;

/// Body of `POST /api/conversations/{id}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    /// Message body.
    pub content: String,
    /// Kind of content; defaults to text.
    #[serde(default)]
    pub message_type: MessageType,
}
