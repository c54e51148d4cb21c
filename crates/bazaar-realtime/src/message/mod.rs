//! Chat frame types, parsing, serialization, and validation.

pub mod builder;
pub mod serializer;
pub mod types;
pub mod validator;

pub use types::{ClientFrame, FrameParseError, MessageData, ServerFrame};
