//! PostgreSQL implementations of the store contracts.

pub mod conversation;
pub mod message;
pub mod presence;

pub use conversation::ConversationRepository;
pub use message::MessageRepository;
pub use presence::PresenceRepository;
