use std::sync::Arc;

use relaychat_session::UserSession;
use relaychat_store::Store;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Read-receipt aggregator: flushes a user's in-memory
/// `read_list` (C3) forward to the `Conversation.last_read_msg_id` cursor.
///
/// Holds no state of its own — every flush reads the snapshot straight out
/// of the `UserSession` the session hub already owns, and writes through
/// [`relaychat_store::Store::merge_read_cursor`]'s `CASE` expression so a
/// flush can never regress a cursor a faster write already advanced past
/// ("monotonically non-decreasing under any interleaving of
/// flushes").
#[derive(Clone)]
pub struct ReadReceiptAggregator {
    store: Store,
}

impl ReadReceiptAggregator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Flush every room cursor currently held for `user_id`.
    pub async fn flush_user(
        &self,
        user_id: u64,
        user_state: &Arc<RwLock<UserSession>>,
        now_ms: i64,
    ) -> Result<()> {
        let snapshot = user_state.read().await.read_list_snapshot();
        for (room_id, last_read_msg_id) in snapshot {
            self.store
                .merge_read_cursor(user_id, room_id, last_read_msg_id, now_ms)
                .await?;
        }
        debug!(user_id, "flushed read cursors");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn test_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("pool");
        let store = Store::new(pool, "im_");
        store.init().await.expect("init");
        store
    }

    #[tokio::test]
    async fn flush_writes_every_room_cursor() {
        let store = test_store().await;
        let aggregator = ReadReceiptAggregator::new(store.clone());

        let state = Arc::new(RwLock::new(UserSession::default()));
        state.write().await.merge_read(1, 10);
        state.write().await.merge_read(2, 20);

        aggregator.flush_user(7, &state, 1_000).await.unwrap();

        let conv1 = store.get_conversation(7, 1).await.unwrap().unwrap();
        let conv2 = store.get_conversation(7, 2).await.unwrap().unwrap();
        assert_eq!(conv1.last_read_msg_id, Some(10));
        assert_eq!(conv2.last_read_msg_id, Some(20));
    }

    #[tokio::test]
    async fn repeated_flush_never_regresses_cursor() {
        let store = test_store().await;
        let aggregator = ReadReceiptAggregator::new(store.clone());

        let state = Arc::new(RwLock::new(UserSession::default()));
        state.write().await.merge_read(1, 50);
        aggregator.flush_user(7, &state, 1_000).await.unwrap();

        // A stale flush from a slower device must not regress the cursor.
        let stale_state = Arc::new(RwLock::new(UserSession::default()));
        stale_state.write().await.merge_read(1, 5);
        aggregator.flush_user(7, &stale_state, 2_000).await.unwrap();

        let conv = store.get_conversation(7, 1).await.unwrap().unwrap();
        assert_eq!(conv.last_read_msg_id, Some(50));
    }
}
