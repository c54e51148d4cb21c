//! Broadcast router: delivers frames to sockets and prunes the dead ones.
//!
//! Every delivery queues the frame on each target socket concurrently with
//! a bounded wait. A socket that cannot take the frame is marked dead and
//! torn down after the delivery round; the other targets are unaffected.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use bazaar_core::config::RealtimeConfig;
use bazaar_core::result::AppResult;
use bazaar_core::types::{ConversationId, MessageId, UserId};
use bazaar_database::PresenceStore;
use bazaar_entity::Message;

use crate::connection::handle::{ConnectionHandle, ConnectionId, WireMessage, close_code};
use crate::connection::registry::{Arrival, ConnectionRegistry, Departure};
use crate::message::builder;
use crate::message::serializer;
use crate::message::types::ServerFrame;
use crate::metrics::RealtimeMetrics;

/// Routes frames to connected users and owns connection attach/teardown.
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
    presence_store: Arc<dyn PresenceStore>,
    metrics: Arc<RealtimeMetrics>,
    write_timeout: Duration,
    max_connections_per_user: usize,
}

impl std::fmt::Debug for BroadcastRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastRouter")
            .field("connections", &self.registry.connection_count())
            .field("write_timeout", &self.write_timeout)
            .field("max_connections_per_user", &self.max_connections_per_user)
            .finish()
    }
}

impl BroadcastRouter {
    /// Creates a new router.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence_store: Arc<dyn PresenceStore>,
        metrics: Arc<RealtimeMetrics>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            registry,
            presence_store,
            metrics,
            write_timeout: config.write_timeout(),
            max_connections_per_user: config.max_connections_per_user,
        }
    }

    /// The registry this router delivers through.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Gateway metrics.
    pub fn metrics(&self) -> &Arc<RealtimeMetrics> {
        &self.metrics
    }

    /// Upper bound for queueing one frame on one socket.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Registers an authorized connection.
    ///
    /// Evicts the user's oldest sockets beyond the per-user cap, records the
    /// connection in the presence store, and announces the user to the
    /// conversation if this was their first socket. When the presence store
    /// fails the registration is undone and the error returned.
    pub async fn attach(&self, handle: Arc<ConnectionHandle>) -> AppResult<Arrival> {
        let arrival = self.registry.connect(Arc::clone(&handle));

        self.evict_over_limit(arrival.user_id, arrival.conn_id).await;

        if let Err(e) = self
            .presence_store
            .update_presence(arrival.user_id, true, 1)
            .await
        {
            error!(
                conn_id = %arrival.conn_id,
                user_id = %arrival.user_id,
                error = %e,
                "Failed to record presence on connect"
            );
            self.registry.disconnect(arrival.conn_id);
            return Err(e);
        }

        self.metrics.connection_opened();

        info!(
            conn_id = %arrival.conn_id,
            user_id = %arrival.user_id,
            conversation_id = %arrival.conversation_id,
            connection_count = arrival.connection_count,
            "Chat connection attached"
        );

        // Presence may have flipped again while the store call was pending.
        if arrival.went_online && self.registry.is_user_online(arrival.user_id) {
            self.broadcast_presence(arrival.conversation_id, arrival.user_id, true)
                .await;
        }

        Ok(arrival)
    }

    /// Tears a connection down.
    ///
    /// Returns `None` when the connection was already released; only the
    /// first caller runs the presence update and offline announcement.
    pub async fn release(&self, conn_id: ConnectionId) -> Option<Departure> {
        let departure = self.registry.disconnect(conn_id)?;
        self.settle(departure).await;
        Some(departure)
    }

    /// Runs the follow-up of a committed disconnect.
    pub async fn settle(&self, departure: Departure) {
        let dead = self.settle_one(departure).await;
        self.reap(dead).await;
    }

    async fn settle_one(&self, departure: Departure) -> Vec<ConnectionId> {
        if let Err(e) = self
            .presence_store
            .update_presence(departure.user_id, !departure.went_offline, -1)
            .await
        {
            error!(
                conn_id = %departure.conn_id,
                user_id = %departure.user_id,
                error = %e,
                "Failed to record presence on disconnect"
            );
        }

        self.metrics.connection_closed();

        info!(
            conn_id = %departure.conn_id,
            user_id = %departure.user_id,
            conversation_id = %departure.conversation_id,
            remaining = departure.remaining,
            "Chat connection released"
        );

        // A reconnect during the store call has already announced the user
        // online; an offline frame now would be stale.
        if !departure.went_offline || self.registry.is_user_online(departure.user_id) {
            return Vec::new();
        }

        let frame = builder::build_presence(departure.conversation_id, departure.user_id, false);
        let targets = self.conversation_targets(departure.conversation_id, Some(departure.user_id));
        let (_, dead) = self.deliver(&targets, &frame).await;
        dead
    }

    /// Tears down sockets whose writes failed.
    ///
    /// Worklist rather than recursion: an offline announcement made while
    /// pruning can itself hit dead sockets.
    async fn reap(&self, mut dead: Vec<ConnectionId>) {
        while let Some(conn_id) = dead.pop() {
            let Some(departure) = self.registry.disconnect(conn_id) else {
                continue;
            };
            self.metrics.socket_pruned();
            debug!(conn_id = %conn_id, user_id = %departure.user_id, "Pruned dead connection");
            dead.extend(self.settle_one(departure).await);
        }
    }

    async fn evict_over_limit(&self, user_id: UserId, newest: ConnectionId) {
        if self.max_connections_per_user == 0 {
            return;
        }

        while self.registry.connection_count_for_user(user_id) > self.max_connections_per_user {
            let Some(oldest) = self.registry.oldest_connection_for_user(user_id, newest) else {
                break;
            };

            warn!(
                user_id = %user_id,
                conn_id = %oldest.id,
                max = self.max_connections_per_user,
                "User at max connections, evicting oldest"
            );

            oldest
                .send(
                    WireMessage::close(close_code::POLICY_VIOLATION, "connection limit reached"),
                    self.write_timeout,
                )
                .await;
            oldest.mark_dead();
            self.reap(vec![oldest.id]).await;
        }
    }

    /// Sends a frame to a single socket. A failed write prunes it.
    pub async fn send_to_connection(&self, handle: &Arc<ConnectionHandle>, frame: &ServerFrame) -> bool {
        let (delivered, dead) = self.deliver(std::slice::from_ref(handle), frame).await;
        self.reap(dead).await;
        delivered.len() == 1
    }

    /// Sends a frame to every socket of a user. Returns the number of
    /// sockets that accepted it.
    pub async fn send_to_user(&self, user_id: UserId, frame: &ServerFrame) -> usize {
        let targets = self.registry.connections_for_user(user_id);
        let (delivered, dead) = self.deliver(&targets, frame).await;
        self.reap(dead).await;
        delivered.len()
    }

    /// Sends a frame to every socket of every connected participant of a
    /// conversation, optionally skipping one user. Returns the number of
    /// sockets that accepted it.
    pub async fn broadcast_to_conversation(
        &self,
        conversation_id: ConversationId,
        frame: &ServerFrame,
        exclude: Option<UserId>,
    ) -> usize {
        let targets = self.conversation_targets(conversation_id, exclude);
        let (delivered, dead) = self.deliver(&targets, frame).await;
        self.reap(dead).await;
        delivered.len()
    }

    /// Broadcasts a persisted message to the whole conversation, sender
    /// included. Returns how many sockets of users other than the sender
    /// received it.
    pub async fn broadcast_message(&self, message: &Message) -> usize {
        let frame = builder::build_message(message);
        let targets = self.conversation_targets(message.conversation_id, None);
        let (delivered, dead) = self.deliver(&targets, &frame).await;
        self.reap(dead).await;
        delivered
            .iter()
            .filter(|handle| handle.user_id != message.sender_user_id)
            .count()
    }

    /// Broadcasts a typing indicator to everyone but the typist.
    pub async fn broadcast_typing(&self, conversation_id: ConversationId, user_id: UserId, is_typing: bool) -> usize {
        let frame = builder::build_typing(conversation_id, user_id, is_typing);
        self.broadcast_to_conversation(conversation_id, &frame, Some(user_id))
            .await
    }

    /// Broadcasts a presence change to everyone but the user it concerns.
    pub async fn broadcast_presence(&self, conversation_id: ConversationId, user_id: UserId, is_online: bool) -> usize {
        let frame = builder::build_presence(conversation_id, user_id, is_online);
        self.broadcast_to_conversation(conversation_id, &frame, Some(user_id))
            .await
    }

    /// Broadcasts a read receipt to the whole conversation, reader included.
    pub async fn broadcast_read_receipt(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        read_by: UserId,
        read_at: chrono::DateTime<chrono::Utc>,
    ) -> usize {
        let frame = builder::build_read_receipt(conversation_id, message_id, read_by, read_at);
        self.broadcast_to_conversation(conversation_id, &frame, None)
            .await
    }

    fn conversation_targets(
        &self,
        conversation_id: ConversationId,
        exclude: Option<UserId>,
    ) -> Vec<Arc<ConnectionHandle>> {
        self.registry
            .participants_of(conversation_id)
            .into_iter()
            .filter(|user_id| Some(*user_id) != exclude)
            .flat_map(|user_id| self.registry.connections_for_user(user_id))
            .collect()
    }

    /// Queues `frame` on every target concurrently.
    ///
    /// Returns the handles that accepted the frame and the ids of those
    /// that failed. Failed handles are already marked dead.
    async fn deliver(
        &self,
        targets: &[Arc<ConnectionHandle>],
        frame: &ServerFrame,
    ) -> (Vec<Arc<ConnectionHandle>>, Vec<ConnectionId>) {
        if targets.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let wire = match serializer::to_wire(frame) {
            Ok(wire) => wire,
            Err(e) => {
                error!(frame = frame.kind(), error = %e, "Failed to serialize frame");
                return (Vec::new(), Vec::new());
            }
        };

        let timeout = self.write_timeout;
        let results = join_all(targets.iter().map(|handle| {
            let wire = wire.clone();
            async move { (Arc::clone(handle), handle.send(wire, timeout).await) }
        }))
        .await;

        let mut delivered = Vec::with_capacity(results.len());
        let mut dead = Vec::new();
        for (handle, ok) in results {
            if ok {
                delivered.push(handle);
            } else {
                dead.push(handle.id);
            }
        }

        self.metrics.frames_sent(delivered.len() as u64);
        (delivered, dead)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_database::MemoryStore;
    use bazaar_entity::MessageType;
    use tokio::sync::mpsc;

    use super::*;

    struct Socket {
        handle: Arc<ConnectionHandle>,
        rx: mpsc::Receiver<WireMessage>,
    }

    impl Socket {
        fn frames(&mut self) -> Vec<serde_json::Value> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                if let WireMessage::Text(text) = msg {
                    out.push(serde_json::from_str(&text).unwrap());
                }
            }
            out
        }
    }

    fn router_with(config: RealtimeConfig) -> (BroadcastRouter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let router = BroadcastRouter::new(
            Arc::new(ConnectionRegistry::new()),
            store.clone(),
            Arc::new(RealtimeMetrics::new()),
            &config,
        );
        (router, store)
    }

    fn router() -> (BroadcastRouter, Arc<MemoryStore>) {
        router_with(RealtimeConfig {
            write_timeout_ms: 20,
            ..RealtimeConfig::default()
        })
    }

    async fn join(router: &BroadcastRouter, user: UserId, conv: ConversationId, capacity: usize) -> Socket {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Arc::new(ConnectionHandle::new(user, conv, tx));
        router.attach(handle.clone()).await.unwrap();
        Socket { handle, rx }
    }

    #[tokio::test]
    async fn test_typing_excludes_typist() {
        let (router, _) = router();
        let conv = ConversationId::new();
        let (a, b) = (UserId::new(), UserId::new());
        let mut sa = join(&router, a, conv, 16).await;
        let mut sb = join(&router, b, conv, 16).await;
        sa.frames();

        assert_eq!(router.broadcast_typing(conv, a, true).await, 1);

        assert!(sa.frames().is_empty());
        let got = sb.frames();
        let typing: Vec<_> = got.iter().filter(|f| f["type"] == "typing").collect();
        assert_eq!(typing.len(), 1);
        assert_eq!(typing[0]["user_id"], a.to_string());
        assert_eq!(typing[0]["is_typing"], true);
    }

    #[tokio::test]
    async fn test_message_reaches_sender_too() {
        let (router, _) = router();
        let conv = ConversationId::new();
        let (a, b) = (UserId::new(), UserId::new());
        let mut sa = join(&router, a, conv, 16).await;
        let mut sb = join(&router, b, conv, 16).await;
        sa.frames();
        sb.frames();

        let message = Message::new(conv, a, "hello", MessageType::Text);
        assert_eq!(router.broadcast_message(&message).await, 1);

        assert_eq!(sa.frames()[0]["data"]["content"], "hello");
        assert_eq!(sb.frames()[0]["data"]["content"], "hello");
    }

    #[tokio::test]
    async fn test_presence_announced_once_per_user() {
        let (router, _) = router();
        let conv = ConversationId::new();
        let (a, b) = (UserId::new(), UserId::new());
        let mut sb = join(&router, b, conv, 16).await;

        let phone = join(&router, a, conv, 16).await;
        let laptop = join(&router, a, conv, 16).await;
        let online: Vec<_> = sb.frames().into_iter().filter(|f| f["type"] == "presence").collect();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0]["is_online"], true);

        router.release(phone.handle.id).await.unwrap();
        assert!(sb.frames().is_empty());

        router.release(laptop.handle.id).await.unwrap();
        let offline = sb.frames();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0]["is_online"], false);

        assert!(router.release(laptop.handle.id).await.is_none());
        assert!(sb.frames().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_socket_is_pruned_without_blocking_others() {
        let (router, _) = router();
        let conv = ConversationId::new();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let _sa = join(&router, a, conv, 16).await;
        // b never drains its single-slot queue.
        let stalled = join(&router, b, conv, 1).await;
        let mut sc = join(&router, c, conv, 16).await;
        sc.frames();

        router.broadcast_typing(conv, a, true).await;
        router.broadcast_typing(conv, a, false).await;

        assert!(!stalled.handle.is_alive());
        assert!(!router.registry().is_user_online(b));
        assert_eq!(router.metrics().snapshot().sockets_pruned, 1);

        let frames = sc.frames();
        assert!(frames.iter().any(|f| f["type"] == "typing" && f["is_typing"] == false));
        assert!(frames.iter().any(|f| f["type"] == "presence" && f["is_online"] == false));
    }

    #[tokio::test]
    async fn test_oldest_socket_evicted_over_limit() {
        let (router, _) = router_with(RealtimeConfig {
            write_timeout_ms: 20,
            max_connections_per_user: 2,
            ..RealtimeConfig::default()
        });
        let conv = ConversationId::new();
        let user = UserId::new();

        let mut first = join(&router, user, conv, 16).await;
        let _second = join(&router, user, conv, 16).await;
        let _third = join(&router, user, conv, 16).await;

        assert_eq!(router.registry().connection_count_for_user(user), 2);
        assert!(!first.handle.is_alive());
        let mut closed = false;
        while let Ok(msg) = first.rx.try_recv() {
            if let WireMessage::Close { code, .. } = msg {
                assert_eq!(code, close_code::POLICY_VIOLATION);
                closed = true;
            }
        }
        assert!(closed);
    }

    #[tokio::test]
    async fn test_presence_store_tracks_connection_count() {
        let (router, store) = router();
        let conv = ConversationId::new();
        let user = UserId::new();

        let one = join(&router, user, conv, 16).await;
        let _two = join(&router, user, conv, 16).await;
        assert_eq!(store.presence(user).unwrap().connection_count, 2);

        router.release(one.handle.id).await;
        let record = store.presence(user).unwrap();
        assert_eq!(record.connection_count, 1);
        assert!(record.is_online);
    }

    /// Presence store that is slow to record disconnects.
    struct SlowOfflineStore(MemoryStore);

    #[async_trait::async_trait]
    impl PresenceStore for SlowOfflineStore {
        async fn update_presence(&self, user_id: UserId, is_online: bool, delta: i32) -> AppResult<()> {
            if delta < 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.0.update_presence(user_id, is_online, delta).await
        }
    }

    #[tokio::test]
    async fn test_reconnect_during_teardown_is_not_announced_offline() {
        let router = Arc::new(BroadcastRouter::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(SlowOfflineStore(MemoryStore::new())),
            Arc::new(RealtimeMetrics::new()),
            &RealtimeConfig {
                write_timeout_ms: 20,
                ..RealtimeConfig::default()
            },
        ));
        let conv = ConversationId::new();
        let (a, b) = (UserId::new(), UserId::new());
        let mut sb = join(&router, b, conv, 16).await;
        let first = join(&router, a, conv, 16).await;
        sb.frames();

        let releasing = tokio::spawn({
            let router = Arc::clone(&router);
            let conn_id = first.handle.id;
            async move { router.release(conn_id).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _second = join(&router, a, conv, 16).await;
        releasing.await.unwrap().unwrap();

        let presence: Vec<_> = sb
            .frames()
            .into_iter()
            .filter(|f| f["type"] == "presence")
            .map(|f| f["is_online"].as_bool().unwrap())
            .collect();
        assert_eq!(presence, vec![true]);
        assert!(router.registry().is_user_online(a));
    }

    #[tokio::test]
    async fn test_read_receipt_includes_reader() {
        let (router, _) = router();
        let conv = ConversationId::new();
        let (a, b) = (UserId::new(), UserId::new());
        let mut sa = join(&router, a, conv, 16).await;
        let mut sb = join(&router, b, conv, 16).await;
        sa.frames();
        sb.frames();

        let sent = router
            .broadcast_read_receipt(conv, MessageId::new(), b, chrono::Utc::now())
            .await;
        assert_eq!(sent, 2);
        assert_eq!(sa.frames()[0]["type"], "read_receipt");
        assert_eq!(sb.frames()[0]["read_by"], b.to_string());
    }
}
