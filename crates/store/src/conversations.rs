use sqlx::FromRow;

use crate::{error::Result, store::Store, types::Conversation};

#[derive(FromRow)]
struct ConversationRow {
    user_id: i64,
    room_id: i64,
    is_muted: i64,
    is_pinned: i64,
    is_visible: i64,
    last_read_msg_id: Option<i64>,
    last_message_id: Option<i64>,
    updated_at: i64,
}

impl From<ConversationRow> for Conversation {
    fn from(r: ConversationRow) -> Self {
        Self {
            user_id: r.user_id as u64,
            room_id: r.room_id as u64,
            is_muted: r.is_muted != 0,
            is_pinned: r.is_pinned != 0,
            is_visible: r.is_visible != 0,
            last_read_msg_id: r.last_read_msg_id.map(|v| v as u64),
            last_message_id: r.last_message_id.map(|v| v as u64),
            updated_at: r.updated_at,
        }
    }
}

/// Message statuses that never count toward `unread_count`: single-deleted
/// (5, in practice never written — single-delete tracks removal via the
/// viewer's own `MessageStatus.is_deleted` instead, already excluded via the
/// join) and either-sided-deleted (6, 7). A recalled message (4) still
/// counts — it surfaces to the viewer as a tombstone, not an omission, so it
/// should still advance their unread count.
const EXCLUDED_MESSAGE_STATUSES: [i16; 3] = [5, 6, 7];

impl Store {
    pub(crate) async fn init_conversations(&self) -> Result<()> {
        let table = self.table("conversations");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                user_id          INTEGER NOT NULL,
                room_id          INTEGER NOT NULL,
                is_muted         INTEGER NOT NULL DEFAULT 0,
                is_pinned        INTEGER NOT NULL DEFAULT 0,
                is_visible       INTEGER NOT NULL DEFAULT 1,
                last_read_msg_id INTEGER,
                last_message_id  INTEGER,
                updated_at       INTEGER NOT NULL,
                PRIMARY KEY (user_id, room_id)
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Lazily create the conversation row on first membership/first message,
    /// leaving existing rows untouched.
    pub async fn ensure_conversation(&self, user_id: u64, room_id: u64, now_ms: i64) -> Result<()> {
        let table = self.table("conversations");
        sqlx::query(&format!(
            r#"INSERT INTO {table} (user_id, room_id, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(user_id, room_id) DO NOTHING"#
        ))
        .bind(user_id as i64)
        .bind(room_id as i64)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_conversation(&self, user_id: u64, room_id: u64) -> Result<Option<Conversation>> {
        let table = self.table("conversations");
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT * FROM {table} WHERE user_id = ? AND room_id = ?"
        ))
        .bind(user_id as i64)
        .bind(room_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_conversations(&self, user_id: u64) -> Result<Vec<Conversation>> {
        let table = self.table("conversations");
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT * FROM {table} WHERE user_id = ? AND is_visible = 1"
        ))
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn set_conversation_visible(
        &self,
        user_id: u64,
        room_id: u64,
        visible: bool,
        now_ms: i64,
    ) -> Result<()> {
        let table = self.table("conversations");
        sqlx::query(&format!(
            "UPDATE {table} SET is_visible = ?, updated_at = ? WHERE user_id = ? AND room_id = ?"
        ))
        .bind(visible)
        .bind(now_ms)
        .bind(user_id as i64)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_conversation_pinned(&self, user_id: u64, room_id: u64, pinned: bool) -> Result<()> {
        let table = self.table("conversations");
        sqlx::query(&format!(
            "UPDATE {table} SET is_pinned = ? WHERE user_id = ? AND room_id = ?"
        ))
        .bind(pinned)
        .bind(user_id as i64)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_conversation_muted(&self, user_id: u64, room_id: u64, muted: bool) -> Result<()> {
        let table = self.table("conversations");
        sqlx::query(&format!(
            "UPDATE {table} SET is_muted = ? WHERE user_id = ? AND room_id = ?"
        ))
        .bind(muted)
        .bind(user_id as i64)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record that the room received a new message, updating
    /// `last_message_id` and flipping the conversation back visible.
    pub async fn touch_conversation_message(
        &self,
        user_id: u64,
        room_id: u64,
        message_id: u64,
        now_ms: i64,
    ) -> Result<()> {
        self.ensure_conversation(user_id, room_id, now_ms).await?;
        let table = self.table("conversations");
        sqlx::query(&format!(
            r#"UPDATE {table}
               SET last_message_id = ?, is_visible = 1, updated_at = ?
               WHERE user_id = ? AND room_id = ?"#
        ))
        .bind(message_id as i64)
        .bind(now_ms)
        .bind(user_id as i64)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Monotonically merge a new read cursor into `last_read_msg_id`.
    ///
    /// Uses a `CASE` predicate instead of read-then-write so concurrent
    /// read-receipts for the same user/room can never regress the cursor:
    /// `max(old, new)` expressed as one statement.
    pub async fn merge_read_cursor(
        &self,
        user_id: u64,
        room_id: u64,
        read_msg_id: u64,
        now_ms: i64,
    ) -> Result<()> {
        self.ensure_conversation(user_id, room_id, now_ms).await?;
        let table = self.table("conversations");
        sqlx::query(&format!(
            r#"UPDATE {table}
               SET last_read_msg_id = CASE
                       WHEN last_read_msg_id IS NULL OR last_read_msg_id < ? THEN ?
                       ELSE last_read_msg_id
                   END,
                   updated_at = ?
               WHERE user_id = ? AND room_id = ?"#
        ))
        .bind(read_msg_id as i64)
        .bind(read_msg_id as i64)
        .bind(now_ms)
        .bind(user_id as i64)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Derived unread count:
    /// messages in the room past the cursor, excluding the viewer's
    /// one-sided deletes and recalled/both-deleted messages.
    pub async fn unread_count(&self, user_id: u64, room_id: u64) -> Result<i64> {
        let conversation = self.get_conversation(user_id, room_id).await?;
        let last_read = conversation.and_then(|c| c.last_read_msg_id).unwrap_or(0);

        let messages_table = self.table("messages");
        let status_table = self.table("message_status");
        let placeholders = EXCLUDED_MESSAGE_STATUSES
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            r#"SELECT COUNT(*) FROM {messages_table} m
               LEFT JOIN {status_table} ms
                 ON ms.message_id = m.id AND ms.user_id = ?
               WHERE m.room_id = ?
                 AND m.id > ?
                 AND m.status NOT IN ({placeholders})
                 AND (ms.is_deleted IS NULL OR ms.is_deleted = 0)"#
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(user_id as i64)
            .bind(room_id as i64)
            .bind(last_read as i64);
        for status in EXCLUDED_MESSAGE_STATUSES {
            query = query.bind(status);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::NewMessage;
    use crate::test_support::test_store;

    fn msg(room_id: u64) -> NewMessage<'static> {
        NewMessage {
            room_id,
            sender_id: 1,
            reply_to: None,
            r#type: 1,
            content: "hi",
            extra: &serde_json::Value::Null,
            is_system: false,
            is_encrypted: false,
            status: 1,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn read_cursor_merge_is_monotonic() {
        let store = test_store().await;
        store.merge_read_cursor(10, 100, 50, 1).await.unwrap();
        store.merge_read_cursor(10, 100, 10, 2).await.unwrap();
        let conv = store.get_conversation(10, 100).await.unwrap().unwrap();
        assert_eq!(conv.last_read_msg_id, Some(50));

        store.merge_read_cursor(10, 100, 90, 3).await.unwrap();
        let conv = store.get_conversation(10, 100).await.unwrap().unwrap();
        assert_eq!(conv.last_read_msg_id, Some(90));
    }

    #[tokio::test]
    async fn unread_count_excludes_viewer_deleted_but_keeps_recalled() {
        let store = test_store().await;
        let m1 = store.insert_message(msg(1)).await.unwrap();
        let m2 = store.insert_message(msg(1)).await.unwrap();
        let m3 = store.insert_message(msg(1)).await.unwrap();

        store.ensure_message_status(m1.id, 10, 1).await.unwrap();
        store.ensure_message_status(m2.id, 10, 1).await.unwrap();
        store.ensure_message_status(m3.id, 10, 1).await.unwrap();

        store.set_message_status(m2.id, 4).await.unwrap();
        store.mark_message_deleted(m3.id, 10).await.unwrap();

        // m1 plain, m2 recalled (still counts as a tombstone event), m3
        // single-deleted by this viewer (excluded via the is_deleted join).
        let unread = store.unread_count(10, 1).await.unwrap();
        assert_eq!(unread, 2);
    }
}
