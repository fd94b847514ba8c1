use sqlx::SqlitePool;

use crate::error::Result;

/// Shared handle to the chat-graph database. Holds the connection pool and
/// the configurable table-name prefix.
///
/// Entity-specific CRUD lives in sibling modules as `impl Store { .. }`
/// blocks (`users.rs`, `rooms.rs`, ...) rather than one monolithic file.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    prefix: String,
}

impl Store {
    pub fn new(pool: SqlitePool, table_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: table_prefix.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Prefix a bare table name, e.g. `self.table("messages")` -> `"im_messages"`.
    pub fn table(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Create every table and index used by the store.
    ///
    /// **Deprecated**: in a deployed system schema is normally owned by
    /// migrations; `init` is retained so tests can bootstrap an in-memory
    /// sqlite pool without a migration runner.
    pub async fn init(&self) -> Result<()> {
        self.init_users().await?;
        self.init_rooms().await?;
        self.init_room_users().await?;
        self.init_messages().await?;
        self.init_message_status().await?;
        self.init_conversations().await?;
        self.init_friends().await?;
        self.init_friend_applies().await?;
        self.init_notifications().await?;
        self.init_notices().await?;
        Ok(())
    }
}
