//! Errors raised while handling a single inbound frame.

use thiserror::Error;

use bazaar_core::error::AppError;

use crate::message::types::FrameParseError;

/// Failure while processing one frame on an active connection.
///
/// Everything except [`FrameError::Disconnected`] is reported to the
/// client as an `error` frame and the connection stays active.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame itself was bad.
    #[error("{0}")]
    Protocol(String),
    /// A store call failed.
    #[error(transparent)]
    Store(#[from] AppError),
    /// The connection's own socket is gone.
    #[error("connection closed")]
    Disconnected,
}

impl FrameError {
    /// Text safe to show the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Protocol(message) => message.clone(),
            Self::Store(err) => err.client_message().to_string(),
            Self::Disconnected => "Connection closed".to_string(),
        }
    }
}

impl From<FrameParseError> for FrameError {
    fn from(err: FrameParseError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_masked() {
        let err = FrameError::from(AppError::database("connection refused on 10.0.0.3"));
        assert_eq!(err.client_message(), "Internal server error");

        let err = FrameError::from(AppError::not_found("Message not found"));
        assert_eq!(err.client_message(), "Message not found");
    }

    #[test]
    fn test_parse_errors_pass_through() {
        let err = FrameError::from(FrameParseError::UnknownType("shout".into()));
        assert_eq!(err.client_message(), "Unknown message type: shout");
    }
}
