//! Per-connection chat protocol.

pub mod error;
pub mod handler;
pub mod state;

pub use error::FrameError;
pub use handler::{ConnectRequest, ProtocolHandler, SessionEnd, TransportEvent};
pub use state::ConnectionState;
