use sqlx::FromRow;

use crate::{
    error::{Error, Result},
    store::Store,
    types::Room,
};

#[derive(FromRow)]
struct RoomRow {
    id: i64,
    room_account: String,
    r#type: i64,
    name: String,
    avatar: String,
    creator_id: i64,
    last_message_id: Option<i64>,
    mute_flag: i64,
    mute_until: Option<i64>,
    daily_mute_start: Option<String>,
    daily_mute_duration_min: i64,
}

impl From<RoomRow> for Room {
    fn from(r: RoomRow) -> Self {
        Self {
            id: r.id as u64,
            room_account: r.room_account,
            r#type: r.r#type as i16,
            name: r.name,
            avatar: r.avatar,
            creator_id: r.creator_id as u64,
            last_message_id: r.last_message_id.map(|v| v as u64),
            mute_flag: r.mute_flag != 0,
            mute_until: r.mute_until,
            daily_mute_start: r.daily_mute_start,
            daily_mute_duration_min: r.daily_mute_duration_min,
        }
    }
}

/// Canonical `room_account` for the dyadic private room between two users
///. Order-independent so both directions
/// resolve to the same room.
pub fn private_room_account(a: u64, b: u64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("private_{lo}_{hi}")
}

impl Store {
    pub(crate) async fn init_rooms(&self) -> Result<()> {
        let table = self.table("rooms");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                room_account            TEXT    NOT NULL UNIQUE,
                type                    INTEGER NOT NULL,
                name                    TEXT    NOT NULL DEFAULT '',
                avatar                  TEXT    NOT NULL DEFAULT '',
                creator_id              INTEGER NOT NULL,
                last_message_id         INTEGER,
                mute_flag               INTEGER NOT NULL DEFAULT 0,
                mute_until              INTEGER,
                daily_mute_start        TEXT,
                daily_mute_duration_min INTEGER NOT NULL DEFAULT 0
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_room(&self, id: u64) -> Result<Option<Room>> {
        let table = self.table("rooms");
        let row = sqlx::query_as::<_, RoomRow>(&format!("SELECT * FROM {table} WHERE id = ?"))
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_room_by_account(&self, room_account: &str) -> Result<Option<Room>> {
        let table = self.table("rooms");
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT * FROM {table} WHERE room_account = ?"
        ))
        .bind(room_account)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn create_group_room(&self, name: &str, avatar: &str, creator_id: u64) -> Result<Room> {
        let table = self.table("rooms");
        let room_account = format!("group_{}", uuid_like(creator_id));
        let id: i64 = sqlx::query_scalar(&format!(
            r#"INSERT INTO {table} (room_account, type, name, avatar, creator_id)
               VALUES (?, 2, ?, ?, ?)
               RETURNING id"#
        ))
        .bind(&room_account)
        .bind(name)
        .bind(avatar)
        .bind(creator_id as i64)
        .fetch_one(&self.pool)
        .await?;

        self.get_room(id as u64)
            .await?
            .ok_or_else(|| Error::NotFound(format!("room {id}")))
    }

    /// Get-or-create the canonical private room between two users.
    ///
    /// Idempotent under concurrent callers: `INSERT ... ON CONFLICT DO
    /// NOTHING` followed by a read guarantees exactly one row for the pair
    /// regardless of race.
    pub async fn get_or_create_private_room(&self, a: u64, b: u64) -> Result<Room> {
        let table = self.table("rooms");
        let account = private_room_account(a, b);
        let creator_id = a.min(b);

        sqlx::query(&format!(
            r#"INSERT INTO {table} (room_account, type, name, avatar, creator_id)
               VALUES (?, 1, '', '', ?)
               ON CONFLICT(room_account) DO NOTHING"#
        ))
        .bind(&account)
        .bind(creator_id as i64)
        .execute(&self.pool)
        .await?;

        self.get_room_by_account(&account)
            .await?
            .ok_or_else(|| Error::NotFound(format!("private room {account}")))
    }

    pub async fn set_last_message(&self, room_id: u64, message_id: u64) -> Result<()> {
        let table = self.table("rooms");
        sqlx::query(&format!(
            "UPDATE {table} SET last_message_id = ? WHERE id = ?"
        ))
        .bind(message_id as i64)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_room_mute(
        &self,
        room_id: u64,
        mute_flag: bool,
        mute_until: Option<i64>,
    ) -> Result<()> {
        let table = self.table("rooms");
        sqlx::query(&format!(
            "UPDATE {table} SET mute_flag = ?, mute_until = ? WHERE id = ?"
        ))
        .bind(mute_flag)
        .bind(mute_until)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_room_daily_mute(
        &self,
        room_id: u64,
        daily_mute_start: Option<&str>,
        daily_mute_duration_min: i64,
    ) -> Result<()> {
        let table = self.table("rooms");
        sqlx::query(&format!(
            "UPDATE {table} SET daily_mute_start = ?, daily_mute_duration_min = ? WHERE id = ?"
        ))
        .bind(daily_mute_start)
        .bind(daily_mute_duration_min)
        .bind(room_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_room_info(&self, room_id: u64, name: &str, avatar: &str) -> Result<()> {
        let table = self.table("rooms");
        sqlx::query(&format!("UPDATE {table} SET name = ?, avatar = ? WHERE id = ?"))
            .bind(name)
            .bind(avatar)
            .bind(room_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Cheap, collision-resistant-enough suffix for group room accounts. Not a
/// security boundary — `room_account` is just an external identifier.
fn uuid_like(seed: u64) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{seed:x}{nanos:x}")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_store;

    #[tokio::test]
    async fn private_room_account_is_order_independent() {
        assert_eq!(private_room_account(7, 8), "private_7_8");
        assert_eq!(private_room_account(8, 7), "private_7_8");
    }

    #[tokio::test]
    async fn get_or_create_private_room_is_idempotent() {
        let store = test_store().await;
        let first = store.get_or_create_private_room(7, 8).await.unwrap();
        let second = store.get_or_create_private_room(8, 7).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.room_account, "private_7_8");
    }

    #[tokio::test]
    async fn create_group_room_has_group_type() {
        let store = test_store().await;
        let room = store.create_group_room("Team", "", 1).await.unwrap();
        assert_eq!(room.r#type, relaychat_protocol::room_type::GROUP);
    }
}
