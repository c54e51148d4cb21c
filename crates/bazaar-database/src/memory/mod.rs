//! Process-local store backend.

pub mod store;

pub use store::MemoryStore;
