use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use relaychat_common::Notifier;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::user_state::{IdentitySnapshot, UserSession};

/// A single live WebSocket connection, registered by the transport layer
/// (`relaychat-gateway`). The session hub never touches the socket itself —
/// only this bounded outbound queue.
struct Connection {
    user_id: u64,
    sender: mpsc::Sender<String>,
}

/// Result of [`SessionHub::attach`]: whether the caller should bootstrap
/// this user's read-cursor snapshot from storage ("On the
/// first connection of a user, bootstrap loads the user's visible-
/// conversation read-cursor snapshot from C1 into C3").
pub struct AttachOutcome {
    pub user_state: Arc<RwLock<UserSession>>,
    pub is_first_connection: bool,
}

/// Multiplexes many connections per user.
///
/// Two maps, one lock each: `connections` for conn_id → live queue,
/// `users` for user_id → shared per-user state (C3) plus the set of conn
/// ids currently attached to it. `RwLock<HashMap<..>>` registries, short
/// critical sections, fan-out under a read lock only.
pub struct SessionHub {
    connections: RwLock<HashMap<String, Connection>>,
    users: RwLock<HashMap<u64, UserEntry>>,
}

struct UserEntry {
    state: Arc<RwLock<UserSession>>,
    conn_ids: HashSet<String>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Bounded outbound channel sized to the recommended per-connection
    /// queue depth. The transport passes the sender half to
    /// [`attach`](Self::attach) and drains the receiver with
    /// [`crate::recv_batch`].
    pub fn new_connection_channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(relaychat_protocol::OUTBOUND_QUEUE_DEPTH)
    }

    /// Register a connection for `user_id`. If this is the user's first
    /// live connection, creates fresh per-user state from `identity`;
    /// otherwise the connection joins the existing shared state and
    /// `identity` is ignored (it was already populated by whichever
    /// connection attached first).
    pub async fn attach(
        &self,
        user_id: u64,
        conn_id: String,
        identity: IdentitySnapshot,
        sender: mpsc::Sender<String>,
    ) -> AttachOutcome {
        self.connections
            .write()
            .await
            .insert(conn_id.clone(), Connection { user_id, sender });

        let mut users = self.users.write().await;
        let is_first_connection = !users.contains_key(&user_id);
        let entry = users.entry(user_id).or_insert_with(|| UserEntry {
            state: Arc::new(RwLock::new(UserSession::new(identity))),
            conn_ids: HashSet::new(),
        });
        entry.conn_ids.insert(conn_id);
        let user_state = Arc::clone(&entry.state);
        drop(users);

        debug!(user_id, is_first_connection, "session attached");
        AttachOutcome {
            user_state,
            is_first_connection,
        }
    }

    /// Remove a connection. Returns the user's state if this was their last
    /// connection — the caller is responsible for flushing it (C7) before
    /// it is dropped.
    pub async fn detach(&self, conn_id: &str) -> Option<Arc<RwLock<UserSession>>> {
        let connection = self.connections.write().await.remove(conn_id)?;
        let user_id = connection.user_id;

        let mut users = self.users.write().await;
        let Some(entry) = users.get_mut(&user_id) else {
            return None;
        };
        entry.conn_ids.remove(conn_id);
        if entry.conn_ids.is_empty() {
            let removed = users.remove(&user_id)?;
            debug!(user_id, "last connection detached, releasing user state");
            return Some(removed.state);
        }
        None
    }

    /// Enqueue `bytes` on every live connection for `user_id`. Non-blocking:
    /// a full queue drops the outbound and logs, rather than stalling the
    /// fan-out for every other recipient.
    pub async fn send_to_user(&self, user_id: u64, bytes: String) {
        let conn_ids = {
            let users = self.users.read().await;
            match users.get(&user_id) {
                Some(entry) => entry.conn_ids.clone(),
                None => return,
            }
        };

        let connections = self.connections.read().await;
        for conn_id in conn_ids {
            let Some(connection) = connections.get(&conn_id) else {
                continue;
            };
            if let Err(err) = connection.sender.try_send(bytes.clone()) {
                warn!(user_id, conn_id, %err, "dropping outbound envelope, queue full or closed");
            }
        }
    }

    /// Debug-only fan-out to every connection regardless of user. Not used
    /// for room fan-out.
    pub async fn broadcast(&self, bytes: String) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            let _ = connection.sender.try_send(bytes.clone());
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_online(&self, user_id: u64) -> bool {
        self.users.read().await.contains_key(&user_id)
    }

    /// Snapshot of every currently-online user's shared state, for the
    /// session-wide periodic read-cursor flush tick (C7's optional trigger
    /// alongside per-connection detach).
    pub async fn online_user_states(&self) -> Vec<(u64, Arc<RwLock<UserSession>>)> {
        self.users
            .read()
            .await
            .iter()
            .map(|(user_id, entry)| (*user_id, Arc::clone(&entry.state)))
            .collect()
    }
}

#[async_trait]
impl Notifier for SessionHub {
    async fn send_to_user(&self, user_id: u64, bytes: String) {
        SessionHub::send_to_user(self, user_id, bytes).await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_device_joins_existing_state() {
        let hub = SessionHub::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        let first = hub
            .attach(1, "conn-a".into(), IdentitySnapshot::default(), tx1)
            .await;
        assert!(first.is_first_connection);
        first.user_state.write().await.merge_read(100, 5);

        let second = hub
            .attach(1, "conn-b".into(), IdentitySnapshot::default(), tx2)
            .await;
        assert!(!second.is_first_connection);
        assert_eq!(second.user_state.read().await.read_cursor(100), Some(5));
    }

    #[tokio::test]
    async fn detach_releases_state_only_after_last_connection() {
        let hub = SessionHub::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        hub.attach(1, "conn-a".into(), IdentitySnapshot::default(), tx1)
            .await;
        hub.attach(1, "conn-b".into(), IdentitySnapshot::default(), tx2)
            .await;

        assert!(hub.detach("conn-a").await.is_none());
        assert!(hub.is_online(1).await);

        assert!(hub.detach("conn-b").await.is_some());
        assert!(!hub.is_online(1).await);
    }

    #[tokio::test]
    async fn send_to_user_reaches_all_devices() {
        let hub = SessionHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);

        hub.attach(1, "conn-a".into(), IdentitySnapshot::default(), tx1)
            .await;
        hub.attach(1, "conn-b".into(), IdentitySnapshot::default(), tx2)
            .await;

        hub.send_to_user(1, "hello".into()).await;

        assert_eq!(rx1.recv().await, Some("hello".to_string()));
        assert_eq!(rx2.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn full_queue_drops_without_affecting_other_recipients() {
        let hub = SessionHub::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(8);

        hub.attach(1, "conn-a".into(), IdentitySnapshot::default(), tx1.clone())
            .await;
        hub.attach(2, "conn-b".into(), IdentitySnapshot::default(), tx2)
            .await;

        tx1.try_send("filler".into()).unwrap();
        hub.send_to_user(1, "dropped".into()).await;
        hub.send_to_user(2, "delivered".into()).await;

        assert_eq!(rx2.recv().await, Some("delivered".to_string()));
    }

    #[tokio::test]
    async fn online_user_states_snapshots_every_attached_user() {
        let hub = SessionHub::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        hub.attach(1, "conn-a".into(), IdentitySnapshot::default(), tx1).await;
        hub.attach(2, "conn-b".into(), IdentitySnapshot::default(), tx2).await;

        let mut users: Vec<u64> = hub.online_user_states().await.into_iter().map(|(id, _)| id).collect();
        users.sort_unstable();
        assert_eq!(users, vec![1, 2]);
    }
}
