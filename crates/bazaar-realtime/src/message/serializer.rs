//! JSON serialization for chat frames.

use crate::connection::handle::WireMessage;

use super::types::ServerFrame;

/// Serialize an outbound frame to JSON text
pub fn serialize_frame(frame: &ServerFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Serialize a frame straight into a queueable [`WireMessage`].
pub fn to_wire(frame: &ServerFrame) -> Result<WireMessage, serde_json::Error> {
    serialize_frame(frame).map(WireMessage::Text)
}
