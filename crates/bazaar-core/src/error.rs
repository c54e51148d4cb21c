//! Error type shared by every Bazaar crate.
//!
//! Stores, the token verifier and the HTTP layer all speak [`AppError`].
//! The realtime core turns it into `error` frames and the API turns it
//! into JSON bodies; both go through [`AppError::client_message`] so
//! infrastructure details never reach a chat client.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text shown to clients in place of an infrastructure failure.
pub const GENERIC_CLIENT_MESSAGE: &str = "Internal server error";

/// Category of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Conversation or message does not exist (or is hidden from the caller).
    NotFound,
    /// Missing, invalid or expired access token.
    Unauthorized,
    /// Authenticated, but not a participant.
    Forbidden,
    /// Bad input: blank content, oversized frame, bad message type.
    Validation,
    Internal,
    Database,
    Configuration,
    Serialization,
    /// A collaborator (token issuer, database) is temporarily down.
    ServiceUnavailable,
}

impl ErrorKind {
    /// Stable machine-readable code used in API bodies and logs.
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
            Self::Database => "DATABASE_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    /// Whether the error was caused by the caller and its message may be
    /// shown to them verbatim.
    pub fn is_caller_fault(self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Unauthorized | Self::Forbidden | Self::Validation
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by every fallible Bazaar operation.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that keeps `source` for logging.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Message safe to send to a client.
    pub fn client_message(&self) -> &str {
        if self.kind.is_caller_fault() {
            &self.message
        } else {
            GENERIC_CLIENT_MESSAGE
        }
    }
}

impl Clone for AppError {
    /// The boxed source is not cloneable and is dropped.
    fn clone(&self) -> Self {
        Self::new(self.kind, self.message.clone())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorKind::Serialization, format!("Invalid JSON: {err}"), err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Internal, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(ErrorKind::Configuration, err.to_string(), err)
    }
}
