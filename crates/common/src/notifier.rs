use async_trait::async_trait;

/// Narrow interface the session hub exposes to services that need to push
/// bytes at a user, breaking the natural cycle between the hub and the
/// services that depend on it. `relaychat-session::SessionHub` implements this; services
/// depend only on the trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_to_user(&self, user_id: u64, bytes: String);
}
