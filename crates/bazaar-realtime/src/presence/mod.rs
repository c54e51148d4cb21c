//! Multi-device user presence accounting.

pub mod tracker;

pub use tracker::{PresenceChange, PresenceRecord, PresenceTracker};
