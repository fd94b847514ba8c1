use sqlx::FromRow;

use crate::{error::Result, store::Store, types::MessageStatus};

#[derive(FromRow)]
struct MessageStatusRow {
    message_id: i64,
    user_id: i64,
    room_id: i64,
    is_read: i64,
    is_deleted: i64,
    read_at: Option<i64>,
}

impl From<MessageStatusRow> for MessageStatus {
    fn from(r: MessageStatusRow) -> Self {
        Self {
            message_id: r.message_id as u64,
            user_id: r.user_id as u64,
            room_id: r.room_id as u64,
            is_read: r.is_read != 0,
            is_deleted: r.is_deleted != 0,
            read_at: r.read_at,
        }
    }
}

impl Store {
    pub(crate) async fn init_message_status(&self) -> Result<()> {
        let table = self.table("message_status");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                message_id INTEGER NOT NULL,
                user_id    INTEGER NOT NULL,
                room_id    INTEGER NOT NULL,
                is_read    INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                read_at    INTEGER,
                PRIMARY KEY (message_id, user_id)
            )"#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_user_room ON {table}(user_id, room_id)"
        ))
        .execute(&self.pool)
        .await
        .ok();

        Ok(())
    }

    /// Ensure a per-recipient status row exists, defaulting to unread.
    /// Called once per fan-out recipient when a message lands.
    pub async fn ensure_message_status(
        &self,
        message_id: u64,
        user_id: u64,
        room_id: u64,
    ) -> Result<()> {
        let table = self.table("message_status");
        sqlx::query(&format!(
            r#"INSERT INTO {table} (message_id, user_id, room_id)
               VALUES (?, ?, ?)
               ON CONFLICT(message_id, user_id) DO NOTHING"#
        ))
        .bind(message_id as i64)
        .bind(user_id as i64)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_message_status(
        &self,
        message_id: u64,
        user_id: u64,
    ) -> Result<Option<MessageStatus>> {
        let table = self.table("message_status");
        let row = sqlx::query_as::<_, MessageStatusRow>(&format!(
            "SELECT * FROM {table} WHERE message_id = ? AND user_id = ?"
        ))
        .bind(message_id as i64)
        .bind(user_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn mark_message_read(&self, message_id: u64, user_id: u64, now_ms: i64) -> Result<()> {
        let table = self.table("message_status");
        sqlx::query(&format!(
            "UPDATE {table} SET is_read = 1, read_at = ? WHERE message_id = ? AND user_id = ?"
        ))
        .bind(now_ms)
        .bind(message_id as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// One-sided delete.
    pub async fn mark_message_deleted(&self, message_id: u64, user_id: u64) -> Result<()> {
        let table = self.table("message_status");
        sqlx::query(&format!(
            "UPDATE {table} SET is_deleted = 1 WHERE message_id = ? AND user_id = ?"
        ))
        .bind(message_id as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_unread_for_user(&self, user_id: u64, room_id: u64) -> Result<Vec<MessageStatus>> {
        let table = self.table("message_status");
        let rows = sqlx::query_as::<_, MessageStatusRow>(&format!(
            "SELECT * FROM {table} WHERE user_id = ? AND room_id = ? AND is_read = 0 AND is_deleted = 0"
        ))
        .bind(user_id as i64)
        .bind(room_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_store;

    #[tokio::test]
    async fn ensure_then_mark_read_roundtrips() {
        let store = test_store().await;
        store.ensure_message_status(1, 10, 100).await.unwrap();
        store.mark_message_read(1, 10, 1_000).await.unwrap();

        let status = store.get_message_status(1, 10).await.unwrap().unwrap();
        assert!(status.is_read);
        assert_eq!(status.read_at, Some(1_000));
    }

    #[tokio::test]
    async fn delete_is_one_sided() {
        let store = test_store().await;
        store.ensure_message_status(1, 10, 100).await.unwrap();
        store.ensure_message_status(1, 20, 100).await.unwrap();
        store.mark_message_deleted(1, 10).await.unwrap();

        let a = store.get_message_status(1, 10).await.unwrap().unwrap();
        let b = store.get_message_status(1, 20).await.unwrap().unwrap();
        assert!(a.is_deleted);
        assert!(!b.is_deleted);
    }
}
