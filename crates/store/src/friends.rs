use sqlx::FromRow;

use crate::{error::Result, store::Store, types::Friend};

#[derive(FromRow)]
struct FriendRow {
    user_id: i64,
    friend_id: i64,
    remark: String,
    group_name: String,
    is_star: i64,
    is_muted: i64,
    status: i64,
}

impl From<FriendRow> for Friend {
    fn from(r: FriendRow) -> Self {
        Self {
            user_id: r.user_id as u64,
            friend_id: r.friend_id as u64,
            remark: r.remark,
            group_name: r.group_name,
            is_star: r.is_star != 0,
            is_muted: r.is_muted != 0,
            status: r.status as i16,
        }
    }
}

impl Store {
    pub(crate) async fn init_friends(&self) -> Result<()> {
        let table = self.table("friends");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                user_id    INTEGER NOT NULL,
                friend_id  INTEGER NOT NULL,
                remark     TEXT    NOT NULL DEFAULT '',
                group_name TEXT    NOT NULL DEFAULT '',
                is_star    INTEGER NOT NULL DEFAULT 0,
                is_muted   INTEGER NOT NULL DEFAULT 0,
                status     INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, friend_id)
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create both directions of a friendship in one call.
    pub async fn create_friend_pair(&self, a: u64, b: u64) -> Result<()> {
        let table = self.table("friends");
        for (user_id, friend_id) in [(a, b), (b, a)] {
            sqlx::query(&format!(
                r#"INSERT INTO {table} (user_id, friend_id, status)
                   VALUES (?, ?, 1)
                   ON CONFLICT(user_id, friend_id) DO UPDATE SET status = 1"#
            ))
            .bind(user_id as i64)
            .bind(friend_id as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_friend(&self, user_id: u64, friend_id: u64) -> Result<Option<Friend>> {
        let table = self.table("friends");
        let row = sqlx::query_as::<_, FriendRow>(&format!(
            "SELECT * FROM {table} WHERE user_id = ? AND friend_id = ?"
        ))
        .bind(user_id as i64)
        .bind(friend_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_friends(&self, user_id: u64) -> Result<Vec<Friend>> {
        let table = self.table("friends");
        let rows = sqlx::query_as::<_, FriendRow>(&format!(
            "SELECT * FROM {table} WHERE user_id = ?"
        ))
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// A private-room block exists iff either direction has `status=2`.
    pub async fn is_blocked(&self, a: u64, b: u64) -> Result<bool> {
        let table = self.table("friends");
        let count: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*) FROM {table}
               WHERE status = 2
                 AND ((user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?))"#
        ))
        .bind(a as i64)
        .bind(b as i64)
        .bind(b as i64)
        .bind(a as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn set_friend_status(&self, user_id: u64, friend_id: u64, status: i16) -> Result<()> {
        let table = self.table("friends");
        sqlx::query(&format!(
            "UPDATE {table} SET status = ? WHERE user_id = ? AND friend_id = ?"
        ))
        .bind(status)
        .bind(user_id as i64)
        .bind(friend_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_friend_remark(&self, user_id: u64, friend_id: u64, remark: &str) -> Result<()> {
        let table = self.table("friends");
        sqlx::query(&format!(
            "UPDATE {table} SET remark = ? WHERE user_id = ? AND friend_id = ?"
        ))
        .bind(remark)
        .bind(user_id as i64)
        .bind(friend_id as i64)
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
    async fn create_friend_pair_is_bidirectional() {
        let store = test_store().await;
        store.create_friend_pair(10, 20).await.unwrap();

        let a = store.get_friend(10, 20).await.unwrap().unwrap();
        let b = store.get_friend(20, 10).await.unwrap().unwrap();
        assert_eq!(a.status, 1);
        assert_eq!(b.status, 1);
    }

    #[tokio::test]
    async fn block_in_either_direction_is_detected() {
        let store = test_store().await;
        store.create_friend_pair(10, 20).await.unwrap();
        store.set_friend_status(20, 10, 2).await.unwrap();

        assert!(store.is_blocked(10, 20).await.unwrap());
        assert!(store.is_blocked(20, 10).await.unwrap());
    }
}
