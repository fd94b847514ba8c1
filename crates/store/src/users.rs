use sqlx::FromRow;

use crate::{
    error::{Error, Result},
    store::Store,
    types::User,
};

#[derive(FromRow)]
struct UserRow {
    id: i64,
    uid: String,
    username: String,
    nickname: String,
    password_hash: String,
    avatar: String,
    phone: Option<String>,
    email: Option<String>,
    gender: i64,
    birthday: Option<i64>,
    signature: String,
    online_status: i64,
    last_login_at: Option<i64>,
    last_active_at: Option<i64>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id as u64,
            uid: r.uid,
            username: r.username,
            nickname: r.nickname,
            password_hash: r.password_hash,
            avatar: r.avatar,
            phone: r.phone,
            email: r.email,
            gender: r.gender as i16,
            birthday: r.birthday,
            signature: r.signature,
            online_status: r.online_status as i16,
            last_login_at: r.last_login_at,
            last_active_at: r.last_active_at,
        }
    }
}

impl Store {
    pub(crate) async fn init_users(&self) -> Result<()> {
        let table = self.table("users");
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                uid            TEXT    NOT NULL UNIQUE,
                username       TEXT    NOT NULL UNIQUE,
                nickname       TEXT    NOT NULL,
                password_hash  TEXT    NOT NULL,
                avatar         TEXT    NOT NULL DEFAULT '',
                phone          TEXT    UNIQUE,
                email          TEXT    UNIQUE,
                gender         INTEGER NOT NULL DEFAULT 0,
                birthday       INTEGER,
                signature      TEXT    NOT NULL DEFAULT '',
                online_status  INTEGER NOT NULL DEFAULT 0,
                last_login_at  INTEGER,
                last_active_at INTEGER
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_user(&self, user: &User) -> Result<User> {
        let table = self.table("users");
        let id: i64 = sqlx::query_scalar(&format!(
            r#"INSERT INTO {table}
               (uid, username, nickname, password_hash, avatar, phone, email,
                gender, birthday, signature, online_status, last_login_at, last_active_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#
        ))
        .bind(&user.uid)
        .bind(&user.username)
        .bind(&user.nickname)
        .bind(&user.password_hash)
        .bind(&user.avatar)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(user.gender)
        .bind(user.birthday)
        .bind(&user.signature)
        .bind(user.online_status)
        .bind(user.last_login_at)
        .bind(user.last_active_at)
        .fetch_one(&self.pool)
        .await?;

        self.get_user(id as u64)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    pub async fn get_user(&self, id: u64) -> Result<Option<User>> {
        let table = self.table("users");
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT * FROM {table} WHERE id = ?"))
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_user_by_uid(&self, uid: &str) -> Result<Option<User>> {
        let table = self.table("users");
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT * FROM {table} WHERE uid = ?"))
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn touch_user_activity(&self, id: u64, now_ms: i64) -> Result<()> {
        let table = self.table("users");
        sqlx::query(&format!(
            "UPDATE {table} SET last_active_at = ? WHERE id = ?"
        ))
        .bind(now_ms)
        .bind(id as i64)
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

    fn sample(uid: &str, username: &str) -> User {
        User {
            id: 0,
            uid: uid.into(),
            username: username.into(),
            nickname: username.into(),
            password_hash: "hash".into(),
            avatar: String::new(),
            phone: None,
            email: None,
            gender: 0,
            birthday: None,
            signature: String::new(),
            online_status: 0,
            last_login_at: None,
            last_active_at: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_user() {
        let store = test_store().await;
        let created = store.create_user(&sample("u-1", "alice")).await.unwrap();
        assert!(created.id > 0);

        let fetched = store.get_user(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");

        let by_uid = store.get_user_by_uid("u-1").await.unwrap().unwrap();
        assert_eq!(by_uid.id, created.id);
    }

    #[tokio::test]
    async fn username_uniqueness_is_enforced() {
        let store = test_store().await;
        store.create_user(&sample("u-1", "alice")).await.unwrap();
        let second = store.create_user(&sample("u-2", "alice")).await;
        assert!(second.is_err());
    }
}
