//! # bazaar-entity
//!
//! Rows owned by the conversation/message store. The realtime core only
//! references these; it never stores message bodies itself.

pub mod conversation;
pub mod message;
pub mod presence;

pub use conversation::Conversation;
pub use message::{Message, MessageStatus, MessageType};
pub use presence::PresenceRecord;
