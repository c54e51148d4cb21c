//! # bazaar-database
//!
//! Persistence collaborators of the chat gateway. The gateway only talks
//! to the traits in [`traits`]; two backends implement them:
//!
//! - [`repositories`]: PostgreSQL via sqlx
//! - [`memory`]: process-local maps for development and tests

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod traits;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use traits::{ConversationStore, MessageStore, PresenceStore};
