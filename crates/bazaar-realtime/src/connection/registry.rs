//! Connection registry: who is connected, and to which conversations.
//!
//! Three indexes plus presence accounting live behind one lock, so every
//! `connect`/`disconnect` commits all of them in a single step and readers
//! never observe a partially applied update. The lock is never held across
//! an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use bazaar_core::types::{ConversationId, UserId};

use crate::presence::tracker::{PresenceChange, PresenceRecord, PresenceTracker};

use super::handle::{ConnectionHandle, ConnectionId};

/// Result of registering a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    /// The registered connection.
    pub conn_id: ConnectionId,
    /// Owning user.
    pub user_id: UserId,
    /// Conversation the socket joined.
    pub conversation_id: ConversationId,
    /// Whether the user went 0 → 1 sockets.
    pub went_online: bool,
    /// The user's socket count after the commit.
    pub connection_count: usize,
}

/// Result of removing a socket. Produced at most once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// The removed connection.
    pub conn_id: ConnectionId,
    /// Owning user.
    pub user_id: UserId,
    /// Conversation the socket belonged to.
    pub conversation_id: ConversationId,
    /// Whether that was the user's last socket.
    pub went_offline: bool,
    /// The user's socket count after the commit.
    pub remaining: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// User → every live socket of that user.
    connections_by_user: HashMap<UserId, HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    /// Conversation → connected participants, with their socket count in it.
    participants_by_conversation: HashMap<ConversationId, HashMap<UserId, usize>>,
    /// Socket → (user, conversation); drives teardown without scans.
    reverse_index: HashMap<ConnectionId, (UserId, ConversationId)>,
    /// Per-user socket accounting.
    presence: PresenceTracker,
}

/// Process-wide registry of live chat sockets.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a socket in all three indexes and counts it for presence.
    ///
    /// The presence transition is computed from the count before this
    /// insert, inside the same commit. Registering an already registered
    /// connection changes nothing.
    pub fn connect(&self, handle: Arc<ConnectionHandle>) -> Arrival {
        let conn_id = handle.id;
        let user_id = handle.user_id;
        let conversation_id = handle.conversation_id;

        let mut state = self.write();

        if state.reverse_index.contains_key(&conn_id) {
            warn!(conn_id = %conn_id, "Connection already registered");
            return Arrival {
                conn_id,
                user_id,
                conversation_id,
                went_online: false,
                connection_count: state.presence.connection_count(user_id),
            };
        }

        let change = state.presence.connection_opened(user_id);
        state
            .connections_by_user
            .entry(user_id)
            .or_default()
            .insert(conn_id, handle);
        *state
            .participants_by_conversation
            .entry(conversation_id)
            .or_default()
            .entry(user_id)
            .or_insert(0) += 1;
        state
            .reverse_index
            .insert(conn_id, (user_id, conversation_id));

        let connection_count = state.presence.connection_count(user_id);
        drop(state);

        debug!(
            conn_id = %conn_id,
            user_id = %user_id,
            conversation_id = %conversation_id,
            connection_count,
            "Connection registered"
        );

        Arrival {
            conn_id,
            user_id,
            conversation_id,
            went_online: change == PresenceChange::WentOnline,
            connection_count,
        }
    }

    /// Removes a socket from every index.
    ///
    /// Idempotent: returns `None` when the connection is not registered
    /// (never was, or another caller already removed it). Exactly one
    /// caller ever receives the `Departure` for a connection.
    pub fn disconnect(&self, conn_id: ConnectionId) -> Option<Departure> {
        let mut state = self.write();

        let (user_id, conversation_id) = state.reverse_index.remove(&conn_id)?;

        if let Some(sockets) = state.connections_by_user.get_mut(&user_id) {
            sockets.remove(&conn_id);
            if sockets.is_empty() {
                state.connections_by_user.remove(&user_id);
            }
        }

        if let Some(participants) = state.participants_by_conversation.get_mut(&conversation_id) {
            if let Some(count) = participants.get_mut(&user_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    participants.remove(&user_id);
                }
            }
            if participants.is_empty() {
                state.participants_by_conversation.remove(&conversation_id);
            }
        }

        let change = state.presence.connection_closed(user_id);
        let remaining = state.presence.connection_count(user_id);
        drop(state);

        debug!(
            conn_id = %conn_id,
            user_id = %user_id,
            conversation_id = %conversation_id,
            remaining,
            "Connection unregistered"
        );

        Some(Departure {
            conn_id,
            user_id,
            conversation_id,
            went_offline: change == PresenceChange::WentOffline,
            remaining,
        })
    }

    /// Whether the user has at least one live socket.
    pub fn is_user_online(&self, user_id: UserId) -> bool {
        self.read().presence.is_online(user_id)
    }

    /// Number of live sockets of a user.
    pub fn connection_count_for_user(&self, user_id: UserId) -> usize {
        self.read().presence.connection_count(user_id)
    }

    /// Cached presence of a user.
    pub fn presence_of(&self, user_id: UserId) -> PresenceRecord {
        self.read().presence.get(user_id)
    }

    /// Users with at least one socket attached to the conversation.
    pub fn participants_of(&self, conversation_id: ConversationId) -> HashSet<UserId> {
        self.read()
            .participants_by_conversation
            .get(&conversation_id)
            .map(|participants| participants.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every live socket of a user.
    pub fn connections_for_user(&self, user_id: UserId) -> Vec<Arc<ConnectionHandle>> {
        self.read()
            .connections_by_user
            .get(&user_id)
            .map(|sockets| sockets.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The user's longest-lived socket other than `except`.
    pub fn oldest_connection_for_user(
        &self,
        user_id: UserId,
        except: ConnectionId,
    ) -> Option<Arc<ConnectionHandle>> {
        self.read()
            .connections_by_user
            .get(&user_id)?
            .values()
            .filter(|handle| handle.id != except)
            .min_by_key(|handle| handle.connected_at)
            .cloned()
    }

    /// Look up a socket by id.
    pub fn connection(&self, conn_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let state = self.read();
        let (user_id, _) = state.reverse_index.get(&conn_id)?;
        state
            .connections_by_user
            .get(user_id)
            .and_then(|sockets| sockets.get(&conn_id))
            .cloned()
    }

    /// Every live socket.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.read()
            .connections_by_user
            .values()
            .flat_map(|sockets| sockets.values().cloned())
            .collect()
    }

    /// Total number of live sockets.
    pub fn connection_count(&self) -> usize {
        self.read().reverse_index.len()
    }

    /// Number of users with at least one socket.
    pub fn online_user_count(&self) -> usize {
        self.read().presence.online_count()
    }

    /// Number of conversations with at least one connected participant.
    pub fn active_conversation_count(&self) -> usize {
        self.read().participants_by_conversation.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::connection::handle::WireMessage;

    fn socket(user: UserId, conv: ConversationId) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel::<WireMessage>(1);
        Arc::new(ConnectionHandle::new(user, conv, tx))
    }

    #[test]
    fn test_connect_populates_every_index() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let conv = ConversationId::new();
        let conn = socket(user, conv);

        let arrival = registry.connect(conn.clone());
        assert!(arrival.went_online);
        assert_eq!(arrival.connection_count, 1);
        assert!(registry.is_user_online(user));
        assert_eq!(registry.participants_of(conv), HashSet::from([user]));
        assert_eq!(registry.connection(conn.id).unwrap().id, conn.id);
        assert_eq!(registry.connections_for_user(user).len(), 1);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let conv = ConversationId::new();
        let conn = socket(user, conv);
        registry.connect(conn.clone());

        let departure = registry.disconnect(conn.id).unwrap();
        assert!(departure.went_offline);
        assert_eq!(departure.remaining, 0);
        assert!(registry.disconnect(conn.id).is_none());
    }

    #[test]
    fn test_multi_device_presence() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let conv = ConversationId::new();
        let sockets: Vec<_> = (0..3).map(|_| socket(user, conv)).collect();

        let arrivals: Vec<_> = sockets.iter().map(|s| registry.connect(s.clone())).collect();
        assert_eq!(
            arrivals.iter().filter(|a| a.went_online).count(),
            1,
            "only the first socket flips the user online"
        );

        let first = registry.disconnect(sockets[0].id).unwrap();
        let second = registry.disconnect(sockets[1].id).unwrap();
        assert!(!first.went_offline);
        assert!(!second.went_offline);
        assert!(registry.is_user_online(user));
        assert_eq!(registry.connection_count_for_user(user), 1);

        let last = registry.disconnect(sockets[2].id).unwrap();
        assert!(last.went_offline);
        assert!(!registry.is_user_online(user));
    }

    #[test]
    fn test_empty_entries_are_dropped() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let conv_a = ConversationId::new();
        let conv_b = ConversationId::new();
        let a = socket(user, conv_a);
        let b = socket(user, conv_b);
        registry.connect(a.clone());
        registry.connect(b.clone());
        assert_eq!(registry.active_conversation_count(), 2);

        registry.disconnect(a.id);
        assert!(registry.participants_of(conv_a).is_empty());
        assert_eq!(registry.participants_of(conv_b), HashSet::from([user]));
        assert_eq!(registry.active_conversation_count(), 1);

        registry.disconnect(b.id);
        assert_eq!(registry.active_conversation_count(), 0);
        assert_eq!(registry.online_user_count(), 0);
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.connections_for_user(user).is_empty());
    }

    #[test]
    fn test_participant_stays_while_another_socket_remains() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let conv = ConversationId::new();
        let phone = socket(user, conv);
        let laptop = socket(user, conv);
        registry.connect(phone.clone());
        registry.connect(laptop.clone());

        registry.disconnect(phone.id);
        assert_eq!(registry.participants_of(conv), HashSet::from([user]));
    }

    #[test]
    fn test_duplicate_connect_is_ignored() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let conn = socket(user, ConversationId::new());

        registry.connect(conn.clone());
        let again = registry.connect(conn.clone());
        assert!(!again.went_online);
        assert_eq!(registry.connection_count_for_user(user), 1);
    }

    #[test]
    fn test_concurrent_connect_disconnect_keeps_counts_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = UserId::new();
        let conv = ConversationId::new();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let conn = socket(user, conv);
                        registry.connect(conn.clone());
                        registry.disconnect(conn.id).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert!(!registry.is_user_online(user));
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.active_conversation_count(), 0);
    }
}
