//! Message entity, content kinds, and delivery status.

pub mod kind;
pub mod model;
pub mod status;

pub use kind::MessageType;
pub use model::Message;
pub use status::MessageStatus;
