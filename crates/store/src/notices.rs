use sqlx::FromRow;

use crate::{error::Result, store::Store, types::RoomNotice};

#[derive(FromRow)]
struct RoomNoticeRow {
    room_id: i64,
    actor_id: i64,
    title: String,
    content: String,
    is_pinned: i64,
}

impl From<RoomNoticeRow> for RoomNotice {
    fn from(r: RoomNoticeRow) -> Self {
        Self {
            room_id: r.room_id as u64,
            actor_id: r.actor_id as u64,
            title: r.title,
            content: r.content,
            is_pinned: r.is_pinned != 0,
        }
    }
}

impl Store {
    pub(crate) async fn init_notices(&self) -> Result<()> {
        let table = self.table("room_notices");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                room_id   INTEGER NOT NULL,
                actor_id  INTEGER NOT NULL,
                title     TEXT    NOT NULL DEFAULT '',
                content   TEXT    NOT NULL DEFAULT '',
                is_pinned INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (room_id)
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_room_notice(
        &self,
        room_id: u64,
        actor_id: u64,
        title: &str,
        content: &str,
        is_pinned: bool,
    ) -> Result<RoomNotice> {
        let table = self.table("room_notices");
        sqlx::query(&format!(
            r#"INSERT INTO {table} (room_id, actor_id, title, content, is_pinned)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(room_id) DO UPDATE SET
                 actor_id = excluded.actor_id,
                 title = excluded.title,
                 content = excluded.content,
                 is_pinned = excluded.is_pinned"#
        ))
        .bind(room_id as i64)
        .bind(actor_id as i64)
        .bind(title)
        .bind(content)
        .bind(is_pinned)
        .execute(&self.pool)
        .await?;

        self.get_room_notice(room_id)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(format!("room_notice {room_id}")))
    }

    pub async fn get_room_notice(&self, room_id: u64) -> Result<Option<RoomNotice>> {
        let table = self.table("room_notices");
        let row = sqlx::query_as::<_, RoomNoticeRow>(&format!(
            "SELECT * FROM {table} WHERE room_id = ?"
        ))
        .bind(room_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_store;

    #[tokio::test]
    async fn set_notice_upserts() {
        let store = test_store().await;
        store.set_room_notice(1, 5, "Welcome", "Be nice", true).await.unwrap();
        let updated = store
            .set_room_notice(1, 5, "Welcome v2", "Be nicer", false)
            .await
            .unwrap();
        assert_eq!(updated.title, "Welcome v2");
        assert!(!updated.is_pinned);
    }
}
