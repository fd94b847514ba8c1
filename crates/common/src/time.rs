use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as unix milliseconds. Stored verbatim in every `created_at`
/// / `updated_at` column across the store.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
