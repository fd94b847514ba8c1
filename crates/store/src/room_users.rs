use sqlx::FromRow;

use crate::{error::Result, store::Store, types::RoomUser};

#[derive(FromRow)]
struct RoomUserRow {
    room_id: i64,
    user_id: i64,
    role: i64,
    nickname: String,
    is_muted: i64,
    muted_until: Option<i64>,
    join_time: i64,
}

impl From<RoomUserRow> for RoomUser {
    fn from(r: RoomUserRow) -> Self {
        Self {
            room_id: r.room_id as u64,
            user_id: r.user_id as u64,
            role: r.role as i16,
            nickname: r.nickname,
            is_muted: r.is_muted != 0,
            muted_until: r.muted_until,
            join_time: r.join_time,
        }
    }
}

impl Store {
    pub(crate) async fn init_room_users(&self) -> Result<()> {
        let table = self.table("room_users");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                room_id     INTEGER NOT NULL,
                user_id     INTEGER NOT NULL,
                role        INTEGER NOT NULL DEFAULT 0,
                nickname    TEXT    NOT NULL DEFAULT '',
                is_muted    INTEGER NOT NULL DEFAULT 0,
                muted_until INTEGER,
                join_time   INTEGER NOT NULL,
                PRIMARY KEY (room_id, user_id)
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_room_member(
        &self,
        room_id: u64,
        user_id: u64,
        role: i16,
        nickname: &str,
        now_ms: i64,
    ) -> Result<RoomUser> {
        let table = self.table("room_users");
        sqlx::query(&format!(
            r#"INSERT INTO {table} (room_id, user_id, role, nickname, join_time)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(room_id, user_id) DO NOTHING"#
        ))
        .bind(room_id as i64)
        .bind(user_id as i64)
        .bind(role)
        .bind(nickname)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(self.get_room_user(room_id, user_id).await?.ok_or_else(|| {
            crate::error::Error::NotFound(format!("room_user {room_id}/{user_id}"))
        })?)
    }

    pub async fn get_room_user(&self, room_id: u64, user_id: u64) -> Result<Option<RoomUser>> {
        let table = self.table("room_users");
        let row = sqlx::query_as::<_, RoomUserRow>(&format!(
            "SELECT * FROM {table} WHERE room_id = ? AND user_id = ?"
        ))
        .bind(room_id as i64)
        .bind(user_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_room_members(&self, room_id: u64) -> Result<Vec<RoomUser>> {
        let table = self.table("room_users");
        let rows = sqlx::query_as::<_, RoomUserRow>(&format!(
            "SELECT * FROM {table} WHERE room_id = ?"
        ))
        .bind(room_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn remove_room_member(&self, room_id: u64, user_id: u64) -> Result<()> {
        let table = self.table("room_users");
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE room_id = ? AND user_id = ?"
        ))
        .bind(room_id as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_room_member_role(&self, room_id: u64, user_id: u64, role: i16) -> Result<()> {
        let table = self.table("room_users");
        sqlx::query(&format!(
            "UPDATE {table} SET role = ? WHERE room_id = ? AND user_id = ?"
        ))
        .bind(role)
        .bind(room_id as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_room_member_mute(
        &self,
        room_id: u64,
        user_id: u64,
        is_muted: bool,
        muted_until: Option<i64>,
    ) -> Result<()> {
        let table = self.table("room_users");
        sqlx::query(&format!(
            "UPDATE {table} SET is_muted = ?, muted_until = ? WHERE room_id = ? AND user_id = ?"
        ))
        .bind(is_muted)
        .bind(muted_until)
        .bind(room_id as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_room_member_nickname(
        &self,
        room_id: u64,
        user_id: u64,
        nickname: &str,
    ) -> Result<()> {
        let table = self.table("room_users");
        sqlx::query(&format!(
            "UPDATE {table} SET nickname = ? WHERE room_id = ? AND user_id = ?"
        ))
        .bind(nickname)
        .bind(room_id as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_store;

    #[tokio::test]
    async fn add_member_is_idempotent_under_conflict() {
        let store = test_store().await;
        store.add_room_member(1, 1, 2, "owner", 0).await.unwrap();
        // second add with different role should not overwrite due to DO NOTHING
        store.add_room_member(1, 1, 0, "member", 0).await.unwrap();
        let member = store.get_room_user(1, 1).await.unwrap().unwrap();
        assert_eq!(member.role, 2);
    }

    #[tokio::test]
    async fn list_room_members_returns_all() {
        let store = test_store().await;
        store.add_room_member(1, 1, 2, "a", 0).await.unwrap();
        store.add_room_member(1, 2, 0, "b", 0).await.unwrap();
        let members = store.list_room_members(1).await.unwrap();
        assert_eq!(members.len(), 2);
    }
}
