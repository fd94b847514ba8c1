use sqlx::FromRow;

use crate::{
    error::{Error, Result},
    store::Store,
    types::FriendApply,
};

#[derive(FromRow)]
struct FriendApplyRow {
    id: i64,
    from_user: i64,
    to_user: i64,
    reason: String,
    status: i64,
    processed_at: Option<i64>,
}

impl From<FriendApplyRow> for FriendApply {
    fn from(r: FriendApplyRow) -> Self {
        Self {
            id: r.id as u64,
            from_user: r.from_user as u64,
            to_user: r.to_user as u64,
            reason: r.reason,
            status: r.status as i16,
            processed_at: r.processed_at,
        }
    }
}

impl Store {
    pub(crate) async fn init_friend_applies(&self) -> Result<()> {
        let table = self.table("friend_applies");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                from_user    INTEGER NOT NULL,
                to_user      INTEGER NOT NULL,
                reason       TEXT    NOT NULL DEFAULT '',
                status       INTEGER NOT NULL DEFAULT 0,
                processed_at INTEGER
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_friend_apply(&self, from_user: u64, to_user: u64, reason: &str) -> Result<FriendApply> {
        let table = self.table("friend_applies");
        let id: i64 = sqlx::query_scalar(&format!(
            r#"INSERT INTO {table} (from_user, to_user, reason, status)
               VALUES (?, ?, ?, 0)
               RETURNING id"#
        ))
        .bind(from_user as i64)
        .bind(to_user as i64)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        self.get_friend_apply(id as u64)
            .await?
            .ok_or_else(|| Error::NotFound(format!("friend_apply {id}")))
    }

    pub async fn get_friend_apply(&self, id: u64) -> Result<Option<FriendApply>> {
        let table = self.table("friend_applies");
        let row = sqlx::query_as::<_, FriendApplyRow>(&format!("SELECT * FROM {table} WHERE id = ?"))
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_pending_applies(&self, to_user: u64) -> Result<Vec<FriendApply>> {
        let table = self.table("friend_applies");
        let rows = sqlx::query_as::<_, FriendApplyRow>(&format!(
            "SELECT * FROM {table} WHERE to_user = ? AND status = 0"
        ))
        .bind(to_user as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Transition a pending apply to `agreed` or `refused`.
    ///
    /// The `WHERE status = 0` predicate makes this an optimistic,
    /// single-row compare-and-swap: a second concurrent accept/refuse on the
    /// same apply affects zero rows and is reported as a conflict, rather
    /// than racing a separate read-then-write.
    pub async fn resolve_friend_apply(&self, id: u64, agreed: bool, now_ms: i64) -> Result<()> {
        let table = self.table("friend_applies");
        let new_status: i16 = if agreed { 1 } else { 2 };
        let affected = sqlx::query(&format!(
            r#"UPDATE {table} SET status = ?, processed_at = ? WHERE id = ? AND status = 0"#
        ))
        .bind(new_status)
        .bind(now_ms)
        .bind(id as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::Conflict(format!(
                "friend_apply {id} already processed"
            )));
        }
        Ok(())
    }
}
