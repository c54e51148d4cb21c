//! Shared domain types.

pub mod id;

pub use id::{ConversationId, ListingId, MessageId, UserId};
