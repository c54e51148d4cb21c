//! Persisted presence rows.

pub mod model;

pub use model::PresenceRecord;
