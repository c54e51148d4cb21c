//! Presence tracker: per-user connection counting.
//!
//! Pure accounting with no I/O. The tracker is owned by the connection
//! registry and only mutated inside its commit step, so a presence
//! transition is always evaluated against the same state the registry
//! maps are committed from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use bazaar_core::types::UserId;

/// Cached presence of one user.
///
/// Invariant: `is_online == (connection_count > 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Whether the user has at least one live socket.
    pub is_online: bool,
    /// Number of live sockets.
    pub connection_count: usize,
}

/// Outcome of a connection count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// 0 → 1: the user just came online.
    WentOnline,
    /// 1 → 0: the user's last socket is gone.
    WentOffline,
    /// N → N±1 with the user still online.
    Unchanged,
}

/// Tracks how many sockets each user has open.
///
/// Users with no sockets are not kept in the map.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    records: HashMap<UserId, PresenceRecord>,
}

impl PresenceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly opened socket for `user_id`.
    pub fn connection_opened(&mut self, user_id: UserId) -> PresenceChange {
        let record = self.records.entry(user_id).or_default();
        let was_online = record.is_online;
        record.connection_count += 1;
        record.is_online = true;

        if was_online {
            PresenceChange::Unchanged
        } else {
            PresenceChange::WentOnline
        }
    }

    /// Count a closed socket for `user_id`.
    ///
    /// Closing a socket for a user the tracker does not know is a no-op.
    pub fn connection_closed(&mut self, user_id: UserId) -> PresenceChange {
        let Some(record) = self.records.get_mut(&user_id) else {
            return PresenceChange::Unchanged;
        };

        record.connection_count = record.connection_count.saturating_sub(1);
        if record.connection_count > 0 {
            return PresenceChange::Unchanged;
        }

        self.records.remove(&user_id);
        PresenceChange::WentOffline
    }

    /// Presence of a user (offline default for unknown users).
    pub fn get(&self, user_id: UserId) -> PresenceRecord {
        self.records.get(&user_id).copied().unwrap_or_default()
    }

    /// Whether `user_id` has at least one socket.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.get(user_id).is_online
    }

    /// Number of sockets `user_id` has open.
    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.get(user_id).connection_count
    }

    /// Number of users currently online.
    pub fn online_count(&self) -> usize {
        self.records.len()
    }
}
