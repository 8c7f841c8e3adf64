use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use matchme_types::models::{MatchId, UserId};

use crate::error::GatewayError;

/// A broadcast domain: one conversation, or one user's notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Conversation(MatchId),
    User(UserId),
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversation(id) => write!(f, "conversation:{}", id),
            Self::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Send side of one live socket.
///
/// Frames go into a bounded queue drained by the connection's writer task.
/// Once the writer is gone the queue is closed and every send fails.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    user_id: UserId,
    tx: mpsc::Sender<Message>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            user_id,
            tx,
            closed: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Queue a frame, waiting at most `timeout` for room.
    pub async fn send(&self, frame: Message, timeout: Duration) -> Result<(), GatewayError> {
        if self.closed.is_cancelled() {
            return Err(self.delivery_error("connection closed"));
        }
        self.tx.send_timeout(frame, timeout).await.map_err(|e| match e {
            mpsc::error::SendTimeoutError::Timeout(_) => self.delivery_error("send timed out"),
            mpsc::error::SendTimeoutError::Closed(_) => self.delivery_error("connection closed"),
        })
    }

    /// Ask the owning session to shut down.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    fn delivery_error(&self, reason: &'static str) -> GatewayError {
        GatewayError::Delivery { conn_id: self.id, reason }
    }
}

#[derive(Default)]
struct Channels {
    members: HashMap<ChannelKey, HashMap<Uuid, ConnectionHandle>>,
    /// conn_id -> the one key it is registered under
    index: HashMap<Uuid, ChannelKey>,
}

/// Live connections grouped by channel.
///
/// Mutations take the write lock; readers get a cloned snapshot so sockets
/// are never written while the lock is held.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Channels>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` under `key`. A handle already registered elsewhere is
    /// moved, so it never appears under two keys.
    pub async fn register(&self, key: ChannelKey, handle: ConnectionHandle) {
        let mut channels = self.inner.write().await;
        let conn_id = handle.id();

        if let Some(previous) = channels.index.insert(conn_id, key) {
            if previous != key {
                remove_member(&mut channels.members, previous, conn_id);
            }
        }

        channels.members.entry(key).or_default().insert(conn_id, handle);
    }

    /// Remove a connection. Returns the handle if it was registered under `key`.
    pub async fn deregister(&self, key: ChannelKey, conn_id: Uuid) -> Option<ConnectionHandle> {
        let mut channels = self.inner.write().await;

        if channels.index.get(&conn_id) != Some(&key) {
            return None;
        }
        channels.index.remove(&conn_id);
        remove_member(&mut channels.members, key, conn_id)
    }

    /// Point-in-time copy of the members of `key`.
    pub async fn members_of(&self, key: ChannelKey) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .await
            .members
            .get(&key)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn contains(&self, key: ChannelKey, conn_id: Uuid) -> bool {
        self.inner.read().await.index.get(&conn_id) == Some(&key)
    }

    pub async fn channel_count(&self) -> usize {
        self.inner.read().await.members.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.index.len()
    }
}

fn remove_member(
    members: &mut HashMap<ChannelKey, HashMap<Uuid, ConnectionHandle>>,
    key: ChannelKey,
    conn_id: Uuid,
) -> Option<ConnectionHandle> {
    let set = members.get_mut(&key)?;
    let removed = set.remove(&conn_id);
    if set.is_empty() {
        members.remove(&key);
    }
    removed
}
