//! Lifecycle states of a chat connection.

use std::fmt;

/// Where a connection is in its lifecycle.
///
/// ```text
/// Connecting → Authenticating → Authorizing → Active → Closing → Closed
///                    └──────────────┴──────────────────────↗
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Socket accepted, nothing checked yet.
    Connecting,
    /// Verifying the access token.
    Authenticating,
    /// Checking conversation membership.
    Authorizing,
    /// Registered and processing frames.
    Active,
    /// Tearing down.
    Closing,
    /// Gone.
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Connecting, Closing)
                | (Authenticating, Authorizing)
                | (Authenticating, Closing)
                | (Authorizing, Active)
                | (Authorizing, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    /// Moves to `next`, returning whether the transition was legal.
    ///
    /// Illegal transitions leave the state untouched.
    pub fn advance(&mut self, next: Self) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Authorizing => "authorizing",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
