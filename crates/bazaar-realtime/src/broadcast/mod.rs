//! Fan-out of frames to users and conversations.

pub mod router;

pub use router::BroadcastRouter;
