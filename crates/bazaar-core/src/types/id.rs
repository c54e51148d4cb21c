//! Typed identifiers for the chat domain.
//!
//! Each id is a UUID on the wire and in PostgreSQL. Message ids are
//! UUIDv7, so they sort in creation order; the rest are random v4.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! chat_id {
    ($(#[$meta:meta])* $name:ident, $generate:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        #[serde(transparent)]
        #[cfg_attr(feature = "sqlx", sqlx(transparent))]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self($generate())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

chat_id!(
    /// A marketplace user: the client or the owner of a listing.
    UserId,
    Uuid::new_v4
);

chat_id!(
    /// A two-party conversation about one listing.
    ConversationId,
    Uuid::new_v4
);

chat_id!(
    /// A persisted chat message.
    MessageId,
    Uuid::now_v7
);

chat_id!(ListingId, Uuid::new_v4);
