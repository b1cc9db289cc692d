use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::ServerEvent;

/// Connection handle, distinct from the user id so that a reconnect does not
/// alias the old connection.
pub type ConnId = Uuid;

/// Explicit room state for the event channel: a registry of live connections
/// and a mapping from room id (user id or chat id) to the connections joined
/// to it. Membership is ephemeral; unregistering a connection removes it from
/// every room.
#[derive(Clone)]
pub struct Rooms {
    inner: Arc<RwLock<RoomsInner>>,
}

#[derive(Default)]
struct RoomsInner {
    conns: HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<Uuid, HashSet<ConnId>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RoomsInner::default())),
        }
    }

    /// Register a new connection. Returns its id and the event receiver.
    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.conns.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop a connection and its membership in every room.
    pub async fn unregister(&self, conn_id: ConnId) {
        let mut inner = self.inner.write().await;
        inner.conns.remove(&conn_id);
        inner.rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Add a connection to a room. Idempotent; unknown connections are ignored.
    pub async fn join(&self, conn_id: ConnId, room_id: Uuid) {
        let mut inner = self.inner.write().await;
        if !inner.conns.contains_key(&conn_id) {
            return;
        }
        inner.rooms.entry(room_id).or_default().insert(conn_id);
    }

    pub async fn leave(&self, conn_id: ConnId, room_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
    }

    /// Deliver an event to every connection currently in `room_id`, except
    /// `exclude`. Best-effort, at-most-once: a closed receiver is skipped
    /// silently. Per-room ordering follows the order of publish calls.
    /// Returns how many connections were sent to.
    pub async fn publish(
        &self,
        room_id: Uuid,
        exclude: Option<ConnId>,
        event: ServerEvent,
    ) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(&room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for conn_id in members {
            if Some(*conn_id) == exclude {
                continue;
            }
            if let Some(tx) = inner.conns.get(conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send directly to one connection (used for setup acknowledgment).
    pub async fn send_to_conn(&self, conn_id: ConnId, event: ServerEvent) {
        let inner = self.inner.read().await;
        if let Some(tx) = inner.conns.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    pub async fn room_size(&self, room_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

impl Default for Rooms {
    fn default() -> Self {
        Self::new()
    }
}
