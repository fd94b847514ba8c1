use std::collections::BTreeSet;

use sqlx::FromRow;

use crate::{
    error::Result,
    store::Store,
    types::{RoomNotification, RoomNotificationDelivery},
};

#[derive(FromRow)]
struct RoomNotificationRow {
    id: i64,
    room_id: i64,
    actor_id: i64,
    event_type: String,
    payload: String,
    created_at: i64,
}

impl TryFrom<RoomNotificationRow> for RoomNotification {
    type Error = serde_json::Error;

    fn try_from(r: RoomNotificationRow) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: r.id as u64,
            room_id: r.room_id as u64,
            actor_id: r.actor_id as u64,
            event_type: r.event_type,
            payload: serde_json::from_str(&r.payload)?,
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct DeliveryRow {
    id: i64,
    user_id: i64,
    event_id: i64,
    room_id: i64,
    is_read: i64,
    read_at: Option<i64>,
    created_at: i64,
}

impl From<DeliveryRow> for RoomNotificationDelivery {
    fn from(r: DeliveryRow) -> Self {
        Self {
            id: r.id as u64,
            user_id: r.user_id as u64,
            event_id: r.event_id as u64,
            room_id: r.room_id as u64,
            is_read: r.is_read != 0,
            read_at: r.read_at,
            created_at: r.created_at,
        }
    }
}

/// Result of publishing a room event: the persisted event plus the
/// recipient ids a delivery row now exists for.
pub struct PublishedNotification {
    pub event: RoomNotification,
    pub recipients: Vec<u64>,
}

impl Store {
    pub(crate) async fn init_notifications(&self) -> Result<()> {
        let events = self.table("room_notifications");
        let deliveries = self.table("room_notification_deliveries");

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {events} (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id    INTEGER NOT NULL,
                actor_id   INTEGER NOT NULL,
                event_type TEXT    NOT NULL,
                payload    TEXT    NOT NULL,
                created_at INTEGER NOT NULL
            )"#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {deliveries} (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL,
                event_id   INTEGER NOT NULL,
                room_id    INTEGER NOT NULL,
                is_read    INTEGER NOT NULL DEFAULT 0,
                read_at    INTEGER,
                created_at INTEGER NOT NULL,
                UNIQUE (user_id, event_id)
            )"#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{deliveries}_user ON {deliveries}(user_id, id)"
        ))
        .execute(&self.pool)
        .await
        .ok();

        Ok(())
    }

    /// Persist one `RoomNotification` and one `RoomNotificationDelivery` per
    /// deduplicated recipient, in a single transaction.
    ///
    /// The `(user_id, event_id)` unique index makes each delivery insert
    /// idempotent under retry; a conflicting insert is silently skipped
    /// rather than erroring, so the caller can safely re-publish after a
    /// partial failure.
    pub async fn publish_room_notification(
        &self,
        room_id: u64,
        actor_id: u64,
        event_type: &str,
        payload: &serde_json::Value,
        recipients: &[u64],
        include_actor: bool,
        now_ms: i64,
    ) -> Result<PublishedNotification> {
        let mut recipient_set: BTreeSet<u64> = recipients.iter().copied().collect();
        if include_actor {
            recipient_set.insert(actor_id);
        } else {
            recipient_set.remove(&actor_id);
        }

        let events = self.table("room_notifications");
        let deliveries = self.table("room_notification_deliveries");
        let payload_json = serde_json::to_string(payload)?;

        let mut tx = self.pool.begin().await?;

        let event_id: i64 = sqlx::query_scalar(&format!(
            r#"INSERT INTO {events} (room_id, actor_id, event_type, payload, created_at)
               VALUES (?, ?, ?, ?, ?)
               RETURNING id"#
        ))
        .bind(room_id as i64)
        .bind(actor_id as i64)
        .bind(event_type)
        .bind(&payload_json)
        .bind(now_ms)
        .fetch_one(&mut *tx)
        .await?;

        for user_id in &recipient_set {
            sqlx::query(&format!(
                r#"INSERT INTO {deliveries} (user_id, event_id, room_id, created_at)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT(user_id, event_id) DO NOTHING"#
            ))
            .bind(*user_id as i64)
            .bind(event_id)
            .bind(room_id as i64)
            .bind(now_ms)
            .execute(&mut *tx)
            .await?;
        }

        let event_row = sqlx::query_as::<_, RoomNotificationRow>(&format!(
            "SELECT * FROM {events} WHERE id = ?"
        ))
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let event: RoomNotification = event_row.try_into()?;
        Ok(PublishedNotification {
            event,
            recipients: recipient_set.into_iter().collect(),
        })
    }

    /// Cursor-paged pull of a recipient's deliveries, newest-first, capped
    /// at 200 rows per call.
    pub async fn list_notifications(
        &self,
        user_id: u64,
        cursor: Option<u64>,
        limit: u32,
        room_id: Option<u64>,
        unread_only: bool,
        since_ms: Option<i64>,
    ) -> Result<Vec<RoomNotificationDelivery>> {
        let table = self.table("room_notification_deliveries");
        let limit = limit.min(200).max(1);

        let mut sql = format!("SELECT * FROM {table} WHERE user_id = ?");
        if cursor.is_some() {
            sql.push_str(" AND id < ?");
        }
        if room_id.is_some() {
            sql.push_str(" AND room_id = ?");
        }
        if unread_only {
            sql.push_str(" AND is_read = 0");
        }
        if since_ms.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, DeliveryRow>(&sql).bind(user_id as i64);
        if let Some(cursor) = cursor {
            query = query.bind(cursor as i64);
        }
        if let Some(room_id) = room_id {
            query = query.bind(room_id as i64);
        }
        if let Some(since_ms) = since_ms {
            query = query.bind(since_ms);
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn mark_notifications_read(&self, user_id: u64, ids: &[u64], now_ms: i64) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = self.table("room_notification_deliveries");
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE {table} SET is_read = 1, read_at = ? WHERE user_id = ? AND id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(now_ms).bind(user_id as i64);
        for id in ids {
            query = query.bind(*id as i64);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_room_notification(&self, id: u64) -> Result<Option<RoomNotification>> {
        let table = self.table("room_notifications");
        let row = sqlx::query_as::<_, RoomNotificationRow>(&format!(
            "SELECT * FROM {table} WHERE id = ?"
        ))
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TryInto::try_into).transpose()?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_store;

    #[tokio::test]
    async fn publish_is_idempotent_per_recipient() {
        let store = test_store().await;
        let published = store
            .publish_room_notification(
                1,
                5,
                "member_added",
                &serde_json::json!({"user_id": 2}),
                &[2, 3, 2],
                false,
                1_000,
            )
            .await
            .unwrap();

        assert_eq!(published.recipients, vec![2, 3]);

        let list = store
            .list_notifications(2, None, 50, None, false, None)
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_then_unread_only_omits_it() {
        let store = test_store().await;
        let published = store
            .publish_room_notification(
                1,
                5,
                "member_added",
                &serde_json::json!({}),
                &[2],
                false,
                1_000,
            )
            .await
            .unwrap();

        let delivery = store
            .list_notifications(2, None, 50, None, false, None)
            .await
            .unwrap()
            .remove(0);
        store
            .mark_notifications_read(2, &[delivery.id], 2_000)
            .await
            .unwrap();

        let unread = store
            .list_notifications(2, None, 50, None, true, None)
            .await
            .unwrap();
        assert!(unread.is_empty());
        let _ = published;
    }
}
