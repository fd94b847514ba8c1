use sqlx::FromRow;

use crate::{error::Result, store::Store, types::Message};

#[derive(FromRow)]
struct MessageRow {
    id: i64,
    room_id: i64,
    sender_id: i64,
    reply_to: Option<i64>,
    r#type: i64,
    content: String,
    extra: String,
    is_system: i64,
    is_encrypted: i64,
    status: i64,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = serde_json::Error;

    fn try_from(r: MessageRow) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: r.id as u64,
            room_id: r.room_id as u64,
            sender_id: r.sender_id as u64,
            reply_to: r.reply_to.map(|v| v as u64),
            r#type: r.r#type as i16,
            content: r.content,
            extra: serde_json::from_str(&r.extra).unwrap_or(serde_json::Value::Null),
            is_system: r.is_system != 0,
            is_encrypted: r.is_encrypted != 0,
            status: r.status as i16,
            created_at: r.created_at,
        })
    }
}

/// New message fields accepted by [`Store::insert_message`].
pub struct NewMessage<'a> {
    pub room_id: u64,
    pub sender_id: u64,
    pub reply_to: Option<u64>,
    pub r#type: i16,
    pub content: &'a str,
    pub extra: &'a serde_json::Value,
    pub is_system: bool,
    pub is_encrypted: bool,
    pub status: i16,
    pub created_at: i64,
}

impl Store {
    pub(crate) async fn init_messages(&self) -> Result<()> {
        let table = self.table("messages");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id      INTEGER NOT NULL,
                sender_id    INTEGER NOT NULL,
                reply_to     INTEGER,
                type         INTEGER NOT NULL,
                content      TEXT    NOT NULL,
                extra        TEXT    NOT NULL DEFAULT '{{}}',
                is_system    INTEGER NOT NULL DEFAULT 0,
                is_encrypted INTEGER NOT NULL DEFAULT 0,
                status       INTEGER NOT NULL DEFAULT 1,
                created_at   INTEGER NOT NULL
            )"#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_room_id ON {table}(room_id, id)"
        ))
        .execute(&self.pool)
        .await
        .ok();

        Ok(())
    }

    pub async fn insert_message(&self, new: NewMessage<'_>) -> Result<Message> {
        let table = self.table("messages");
        let extra_json = serde_json::to_string(new.extra)?;
        let id: i64 = sqlx::query_scalar(&format!(
            r#"INSERT INTO {table}
               (room_id, sender_id, reply_to, type, content, extra, is_system, is_encrypted, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#
        ))
        .bind(new.room_id as i64)
        .bind(new.sender_id as i64)
        .bind(new.reply_to.map(|v| v as i64))
        .bind(new.r#type)
        .bind(new.content)
        .bind(&extra_json)
        .bind(new.is_system)
        .bind(new.is_encrypted)
        .bind(new.status)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await?;

        self.get_message(id as u64)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(format!("message {id}")))
    }

    pub async fn get_message(&self, id: u64) -> Result<Option<Message>> {
        let table = self.table("messages");
        let row = sqlx::query_as::<_, MessageRow>(&format!("SELECT * FROM {table} WHERE id = ?"))
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(TryInto::try_into).transpose()?)
    }

    pub async fn get_messages(&self, ids: &[u64]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.table("messages");
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM {table} WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, MessageRow>(&sql);
        for id in ids {
            query = query.bind(*id as i64);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub async fn set_message_status(&self, id: u64, status: i16) -> Result<()> {
        let table = self.table("messages");
        sqlx::query(&format!("UPDATE {table} SET status = ? WHERE id = ?"))
            .bind(status)
            .bind(id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count messages in `room_id` with `id > after_id` excluding statuses
    /// that should never count toward unread (recalled/deleted) and
    /// excluding `viewer_id`'s own `MessageStatus.is_deleted=true` rows,
    /// used by C9's derived `unread_count`.
    pub async fn count_messages_after(
        &self,
        room_id: u64,
        viewer_id: u64,
        after_id: u64,
        excluded_statuses: &[i16],
    ) -> Result<i64> {
        let messages = self.table("messages");
        let statuses = self.table("message_status");
        let placeholders = excluded_statuses
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        let status_filter = if excluded_statuses.is_empty() {
            String::new()
        } else {
            format!(" AND m.status NOT IN ({placeholders})")
        };
        let sql = format!(
            r#"SELECT COUNT(*) FROM {messages} m
               LEFT JOIN {statuses} s ON s.message_id = m.id AND s.user_id = ?
               WHERE m.room_id = ? AND m.id > ?{status_filter}
                 AND COALESCE(s.is_deleted, 0) = 0"#
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(viewer_id as i64)
            .bind(room_id as i64)
            .bind(after_id as i64);
        for status in excluded_statuses {
            query = query.bind(*status);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }
}
