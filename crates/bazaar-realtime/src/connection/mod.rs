//! Socket handles and the connection registry.

pub mod handle;
pub mod registry;

pub use handle::{ConnectionHandle, ConnectionId, WireMessage};
pub use registry::{Arrival, ConnectionRegistry, Departure};
