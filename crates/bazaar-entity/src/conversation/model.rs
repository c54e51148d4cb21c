//! Conversation entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bazaar_core::types::{ConversationId, ListingId, UserId};

/// A chat thread between a listing's client and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: ConversationId,
    /// The listing this conversation is about.
    pub listing_id: ListingId,
    /// The user who opened the conversation.
    pub client_id: UserId,
    /// The listing owner.
    pub owner_id: UserId,
    /// Hidden from the client's inbox.
    pub archived_by_client: bool,
    /// Hidden from the owner's inbox.
    pub archived_by_owner: bool,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// Last time the conversation changed.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a fresh conversation between a client and a listing owner.
    pub fn new(listing_id: ListingId, client_id: UserId, owner_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            listing_id,
            client_id,
            owner_id,
            archived_by_client: false,
            archived_by_owner: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Both participants, client first.
    pub fn participants(&self) -> [UserId; 2] {
        [self.client_id, self.owner_id]
    }

    /// Whether `user_id` is one of the two participants.
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.client_id == user_id || self.owner_id == user_id
    }

    /// The participant that is not `user_id`, if `user_id` takes part at all.
    pub fn counterpart(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.client_id {
            Some(self.owner_id)
        } else if user_id == self.owner_id {
            Some(self.client_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participants_and_counterpart() {
        let client = UserId::new();
        let owner = UserId::new();
        let conv = Conversation::new(ListingId::new(), client, owner);

        assert!(conv.is_participant(client));
        assert!(conv.is_participant(owner));
        assert!(!conv.is_participant(UserId::new()));
        assert_eq!(conv.counterpart(client), Some(owner));
        assert_eq!(conv.counterpart(owner), Some(client));
        assert_eq!(conv.counterpart(UserId::new()), None);
    }
}
