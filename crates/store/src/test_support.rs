use sqlx::sqlite::SqlitePoolOptions;

use crate::store::Store;

/// In-memory sqlite store, schema bootstrapped via [`Store::init`], for unit
/// tests across the entity modules.
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) async fn test_store() -> Store {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool");
    let store = Store::new(pool, "im_");
    store.init().await.expect("init schema");
    store
}
