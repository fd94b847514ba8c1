use relaychat_policy::{require_can_act_on, require_owner, require_role_at_least};
use relaychat_protocol::{event_type, role};
use relaychat_store::{Room, RoomUser, Store};

use crate::error::{ChatError, Result};
use crate::ingress::ChatService;
use relaychat_notify::NotificationService;

/// Room-membership and admin-surface operations.
///
/// Every mutation is gated by [`relaychat_policy`] then published through
/// [`NotificationService`] so members (online or not) learn about it —
/// the same event+delivery split C4/C5 use for message-level events.
#[derive(Clone)]
pub struct MembershipService {
    chat: ChatService,
    notify: NotificationService,
}

impl MembershipService {
    pub fn new(chat: ChatService, notify: NotificationService) -> Self {
        Self { chat, notify }
    }

    async fn room_and_actor(&self, room_id: u64, actor_id: u64) -> Result<(Room, RoomUser)> {
        let room = self
            .chat
            .store()
            .get_room(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {room_id}")))?;
        let actor = self
            .chat
            .store()
            .get_room_user(room_id, actor_id)
            .await?
            .ok_or(ChatError::Permission("not a member of this room".into()))?;
        Ok((room, actor))
    }

    /// Add a member.
    pub async fn add_member(
        &self,
        room_id: u64,
        actor_id: u64,
        new_user_id: u64,
        nickname: &str,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_role_at_least(actor.role, role::ADMIN)?;

        self.chat
            .store()
            .add_room_member(room_id, new_user_id, role::MEMBER, nickname, now_ms)
            .await?;
        self.chat
            .store()
            .ensure_conversation(new_user_id, room_id, now_ms)
            .await?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::MEMBER_ADDED,
                &serde_json::json!({"user_id": new_user_id}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// Remove a member.
    ///
    /// The evicted user is force-added to the recipient list so their
    /// client learns it was kicked, even though they are no longer a
    /// member by the time the event is delivered.
    pub async fn remove_member(
        &self,
        room_id: u64,
        actor_id: u64,
        target_user_id: u64,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_role_at_least(actor.role, role::ADMIN)?;

        let target = self
            .chat
            .store()
            .get_room_user(room_id, target_user_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room_user {room_id}/{target_user_id}")))?;
        require_can_act_on(actor.role, target.role)?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let mut recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        recipients.push(target_user_id);

        self.chat
            .store()
            .remove_room_member(room_id, target_user_id)
            .await?;
        self.chat
            .store()
            .set_conversation_visible(target_user_id, room_id, false, now_ms)
            .await?;

        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::MEMBER_REMOVED,
                &serde_json::json!({"user_id": target_user_id}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// A member leaves voluntarily; no role gate.
    pub async fn quit(&self, room_id: u64, user_id: u64, now_ms: i64) -> Result<()> {
        self.chat
            .store()
            .get_room_user(room_id, user_id)
            .await?
            .ok_or(ChatError::Permission("not a member of this room".into()))?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();

        self.chat.store().remove_room_member(room_id, user_id).await?;
        self.chat
            .store()
            .set_conversation_visible(user_id, room_id, false, now_ms)
            .await?;

        self.notify
            .publish(
                room_id,
                user_id,
                event_type::MEMBER_QUIT,
                &serde_json::json!({"user_id": user_id}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// Promote/demote a member's role. Setting `role::ADMIN` requires
    /// `role >= 1`; setting `role::OWNER` requires owner.
    pub async fn set_admin(
        &self,
        room_id: u64,
        actor_id: u64,
        target_user_id: u64,
        new_role: i16,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_owner(actor.role)?;

        self.chat
            .store()
            .set_room_member_role(room_id, target_user_id, new_role)
            .await?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::ADMIN_SET,
                &serde_json::json!({"user_id": target_user_id, "role": new_role}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// Update group name/avatar.
    pub async fn update_group_info(
        &self,
        room_id: u64,
        actor_id: u64,
        name: &str,
        avatar: &str,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_role_at_least(actor.role, role::ADMIN)?;

        self.chat.store().set_room_info(room_id, name, avatar).await?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::GROUP_INFO_UPDATED,
                &serde_json::json!({"name": name, "avatar": avatar}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// Set a room-wide countdown mute.
    pub async fn set_room_mute_countdown(
        &self,
        room_id: u64,
        actor_id: u64,
        mute_until: Option<i64>,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_role_at_least(actor.role, role::ADMIN)?;

        self.chat
            .store()
            .set_room_mute(room_id, mute_until.is_some(), mute_until)
            .await?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::MUTE_COUNTDOWN,
                &serde_json::json!({"mute_until": mute_until}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// Set a room-wide daily-recurring mute window.
    pub async fn set_room_mute_daily(
        &self,
        room_id: u64,
        actor_id: u64,
        daily_mute_start: Option<&str>,
        daily_mute_duration_min: i64,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_role_at_least(actor.role, role::ADMIN)?;

        self.chat
            .store()
            .set_room_daily_mute(room_id, daily_mute_start, daily_mute_duration_min)
            .await?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::MUTE_SCHEDULED,
                &serde_json::json!({
                    "daily_mute_start": daily_mute_start,
                    "daily_mute_duration_min": daily_mute_duration_min,
                }),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// Mute a specific member.
    pub async fn set_member_mute(
        &self,
        room_id: u64,
        actor_id: u64,
        target_user_id: u64,
        muted_until: Option<i64>,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_role_at_least(actor.role, role::ADMIN)?;

        self.chat
            .store()
            .set_room_member_mute(room_id, target_user_id, muted_until.is_some(), muted_until)
            .await?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::USER_MUTE,
                &serde_json::json!({"user_id": target_user_id, "muted_until": muted_until}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }

    /// Publish or update the room notice.
    pub async fn set_notice(
        &self,
        room_id: u64,
        actor_id: u64,
        title: &str,
        content: &str,
        is_pinned: bool,
        now_ms: i64,
    ) -> Result<()> {
        let (_, actor) = self.room_and_actor(room_id, actor_id).await?;
        require_role_at_least(actor.role, role::ADMIN)?;

        self.chat
            .store()
            .set_room_notice(room_id, actor_id, title, content, is_pinned)
            .await?;

        let members = self.chat.store().list_room_members(room_id).await?;
        let recipients: Vec<u64> = members.iter().map(|m| m.user_id).collect();
        self.notify
            .publish(
                room_id,
                actor_id,
                event_type::NOTICE_SET,
                &serde_json::json!({"title": title, "content": content, "is_pinned": is_pinned}),
                &recipients,
                true,
                now_ms,
            )
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use relaychat_common::Notifier;
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::Mutex;

    use super::*;

    struct NullNotifier;
    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send_to_user(&self, _user_id: u64, _bytes: String) {}
    }

    struct RecordingNotifier {
        sent: Mutex<Vec<u64>>,
    }
    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_to_user(&self, user_id: u64, _bytes: String) {
            self.sent.lock().await.push(user_id);
        }
    }

    async fn test_service() -> (MembershipService, Store, Arc<RecordingNotifier>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("pool");
        let store = Store::new(pool, "im_");
        store.init().await.expect("init");
        let notifier = Arc::new(RecordingNotifier { sent: Mutex::new(Vec::new()) });
        let chat = ChatService::new(store.clone(), notifier.clone(), chrono_tz::UTC);
        let notify = NotificationService::new(store.clone(), notifier.clone());
        (MembershipService::new(chat, notify), store, notifier)
    }

    #[tokio::test]
    async fn non_admin_cannot_add_member() {
        let (service, store, _n) = test_service().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, role::MEMBER, "", 0).await.unwrap();

        let result = service.add_member(room.id, 1, 99, "new", 0).await;
        assert!(matches!(result, Err(ChatError::Permission(_))));
    }

    #[tokio::test]
    async fn owner_can_remove_member_and_evictee_is_notified() {
        let (service, store, notifier) = test_service().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, role::OWNER, "", 0).await.unwrap();
        store.add_room_member(room.id, 2, role::MEMBER, "", 0).await.unwrap();

        service.remove_member(room.id, 1, 2, 0).await.unwrap();

        assert!(store.get_room_user(room.id, 2).await.unwrap().is_none());
        assert!(notifier.sent.lock().await.contains(&2));
    }

    #[tokio::test]
    async fn admin_cannot_act_on_owner() {
        let (service, store, _n) = test_service().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, role::OWNER, "", 0).await.unwrap();
        store.add_room_member(room.id, 2, role::ADMIN, "", 0).await.unwrap();

        let result = service.remove_member(room.id, 2, 1, 0).await;
        assert!(matches!(result, Err(ChatError::Permission(_))));
    }

    #[tokio::test]
    async fn only_owner_can_set_admin() {
        let (service, store, _n) = test_service().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, role::OWNER, "", 0).await.unwrap();
        store.add_room_member(room.id, 2, role::ADMIN, "", 0).await.unwrap();

        let result = service.set_admin(room.id, 2, 3, role::ADMIN, 0).await;
        assert!(matches!(result, Err(ChatError::Permission(_))));

        service.set_admin(room.id, 1, 2, role::OWNER, 0).await.unwrap();
        let promoted = store.get_room_user(room.id, 2).await.unwrap().unwrap();
        assert_eq!(promoted.role, role::OWNER);
    }
}
