use std::sync::Arc;

use relaychat_common::Notifier;
use relaychat_store::{RoomNotificationDelivery, Store};
use tracing::warn;

use crate::error::Result;

/// One page of a cursor-paged pull.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<u64>,
}

/// Room-event notification service: persists events and
/// per-recipient deliveries through [`Store`], then best-effort pushes over
/// whatever [`Notifier`] the embedder wires up (the session hub in
/// practice). Fan-out failures are logged, never bubbled — delivery to
/// offline recipients relies entirely on the pull contract below.
#[derive(Clone)]
pub struct NotificationService {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

impl NotificationService {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Publish one event plus one delivery row per deduplicated recipient,
    /// then push a `notification` envelope to each.
    ///
    /// Callers are responsible for recipient-list composition, including
    /// the `member_removed` special case of force-adding the evicted user
    /// so their client learns it was kicked.
    pub async fn publish(
        &self,
        room_id: u64,
        actor_id: u64,
        event_type: &str,
        payload: &serde_json::Value,
        recipients: &[u64],
        include_actor: bool,
        now_ms: i64,
    ) -> Result<relaychat_store::PublishedNotification> {
        let published = self
            .store
            .publish_room_notification(
                room_id,
                actor_id,
                event_type,
                payload,
                recipients,
                include_actor,
                now_ms,
            )
            .await?;

        let envelope = serde_json::json!({
            "type": "notification",
            "event_id": published.event.id,
            "room_id": published.event.room_id,
            "actor_id": published.event.actor_id,
            "event_type": published.event.event_type,
            "payload": published.event.payload,
            "created_at": published.event.created_at,
        });
        match serde_json::to_string(&envelope) {
            Ok(bytes) => {
                for user_id in &published.recipients {
                    self.notifier.send_to_user(*user_id, bytes.clone()).await;
                }
            },
            Err(err) => warn!(%err, event_id = published.event.id, "failed to serialize notification envelope"),
        }

        Ok(published)
    }

    /// Cursor-paged pull: newest-first, `since_days` back,
    /// capped at 200 rows.
    pub async fn list(
        &self,
        user_id: u64,
        since_days: i64,
        cursor: Option<u64>,
        limit: u32,
        room_id: Option<u64>,
        unread_only: bool,
        now_ms: i64,
    ) -> Result<Page<RoomNotificationDelivery>> {
        let since_ms = now_ms - since_days.max(0) * 86_400_000;
        let limit = limit.clamp(1, 200);
        let items = self
            .store
            .list_notifications(user_id, cursor, limit, room_id, unread_only, Some(since_ms))
            .await?;
        let next_cursor = if items.len() as u32 == limit {
            items.last().map(|d| d.id)
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    pub async fn mark_read(&self, user_id: u64, ids: &[u64], now_ms: i64) -> Result<()> {
        self.store.mark_notifications_read(user_id, ids, now_ms).await?;
        Ok(())
    }
}
