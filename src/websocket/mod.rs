use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

pub mod broadcast;
pub mod handlers;
pub mod protocol;
pub mod session;

use protocol::ServerEvent;

/// Named broadcast group. Every session sits in its personal inbox room for
/// its whole lifetime and in at most one conversation room at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    User(Uuid),
    Conversation(Uuid),
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKey::User(id) => write!(f, "user:{}", id),
            RoomKey::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

/// In-memory room membership, shared by every connection task. Membership
/// mutations and snapshots happen under a single write guard, so a broadcast
/// either sees a joining session or does not — never a partial set.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<HashMap<RoomKey, HashMap<Uuid, UnboundedSender<ServerEvent>>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-joining replaces the session's sender in place.
    pub async fn join(&self, room: RoomKey, session_id: Uuid, tx: UnboundedSender<ServerEvent>) {
        let mut guard = self.inner.write().await;
        guard.entry(room).or_default().insert(session_id, tx);
    }

    /// Idempotent: leaving a room the session is not in is a no-op.
    pub async fn leave(&self, room: RoomKey, session_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(&room) {
            members.remove(&session_id);
            if members.is_empty() {
                guard.remove(&room);
            }
        }
    }

    /// Best-effort per member: a closed channel is pruned, never an error.
    pub async fn broadcast(&self, room: RoomKey, event: ServerEvent) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(&room) {
            members.retain(|_, tx| tx.send(event.clone()).is_ok());
            if members.is_empty() {
                guard.remove(&room);
            }
        }
    }

    /// Snapshot of the sessions currently in a room.
    pub async fn members(&self, room: RoomKey) -> Vec<Uuid> {
        let guard = self.inner.read().await;
        guard
            .get(&room)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }
}
