//! # bazaar-realtime
//!
//! Real-time chat core for the Bazaar marketplace. Provides:
//!
//! - A process-wide [`ConnectionRegistry`] mapping users, conversations,
//!   and sockets, committed atomically per connect/disconnect
//! - Multi-device [`PresenceTracker`] accounting (user online vs. socket online)
//! - A [`BroadcastRouter`] that fans frames out and prunes dead sockets
//!   without disturbing the rest of a broadcast
//! - The per-connection [`ProtocolHandler`] state machine
//!
//! The crate is transport-agnostic: the handler is generic over a
//! `futures` stream of inbound events and a sink of outbound frames.

pub mod broadcast;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod protocol;
pub mod server;

pub use broadcast::router::BroadcastRouter;
pub use connection::handle::{ConnectionHandle, ConnectionId, WireMessage};
pub use connection::registry::ConnectionRegistry;
pub use presence::tracker::PresenceTracker;
pub use protocol::handler::{ConnectRequest, ProtocolHandler, SessionEnd, TransportEvent};
pub use server::RealtimeEngine;
