use std::sync::Arc;

use relaychat_common::Notifier;
use relaychat_protocol::{role, user_event_type};
use relaychat_store::{FriendApply, Store};

use crate::error::{ChatError, Result};

/// Friend-request lifecycle: apply → accept/reject: creates
/// the bidirectional [`relaychat_store::Friend`] rows and the canonical
/// private room on accept, and pushes the same `friend_*` live-only
/// envelopes C5 uses for `forward`/`recall` ([`crate::recall::push_user_event`]
/// sibling, duplicated here rather than shared since this module has no
/// room to aggregate a fan-out list against — the apply is always 1:1).
#[derive(Clone)]
pub struct FriendsService {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

impl FriendsService {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Submit a friend request. Blocked pairs may not apply.
    pub async fn apply(&self, from_user: u64, to_user: u64, reason: &str, now_ms: i64) -> Result<FriendApply> {
        if from_user == to_user {
            return Err(ChatError::InputInvalid("cannot friend yourself".into()));
        }
        if self.store.is_blocked(from_user, to_user).await? {
            return Err(ChatError::Permission("blocked".into()));
        }

        let apply = self.store.create_friend_apply(from_user, to_user, reason).await?;
        self.push_user_event(
            to_user,
            from_user,
            user_event_type::FRIEND_REQUEST,
            serde_json::json!({"apply_id": apply.id, "reason": reason}),
            now_ms,
        )
        .await?;
        Ok(apply)
    }

    /// Accept a pending apply: resolves the apply via its
    /// optimistic CAS, creates both friend rows, and gets-or-creates the
    /// canonical private room so the pair can message immediately.
    pub async fn accept(&self, apply_id: u64, now_ms: i64) -> Result<()> {
        let apply = self
            .store
            .get_friend_apply(apply_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("friend_apply {apply_id}")))?;

        self.store.resolve_friend_apply(apply_id, true, now_ms).await?;
        self.store.create_friend_pair(apply.from_user, apply.to_user).await?;

        let room = self
            .store
            .get_or_create_private_room(apply.from_user, apply.to_user)
            .await?;
        self.store
            .add_room_member(room.id, apply.from_user, role::MEMBER, "", now_ms)
            .await?;
        self.store
            .add_room_member(room.id, apply.to_user, role::MEMBER, "", now_ms)
            .await?;
        self.store.ensure_conversation(apply.from_user, room.id, now_ms).await?;
        self.store.ensure_conversation(apply.to_user, room.id, now_ms).await?;

        self.push_user_event(
            apply.from_user,
            apply.to_user,
            user_event_type::FRIEND_ACCEPTED,
            serde_json::json!({"apply_id": apply_id, "room_id": room.id}),
            now_ms,
        )
        .await?;
        Ok(())
    }

    /// Reject a pending apply. No room or friend rows are
    /// created; only the requester is told.
    pub async fn reject(&self, apply_id: u64, now_ms: i64) -> Result<()> {
        let apply = self
            .store
            .get_friend_apply(apply_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("friend_apply {apply_id}")))?;

        self.store.resolve_friend_apply(apply_id, false, now_ms).await?;

        self.push_user_event(
            apply.from_user,
            apply.to_user,
            user_event_type::FRIEND_REJECTED,
            serde_json::json!({"apply_id": apply_id}),
            now_ms,
        )
        .await?;
        Ok(())
    }

    /// Remove a friendship.
    pub async fn remove(&self, user_id: u64, friend_id: u64, now_ms: i64) -> Result<()> {
        self.store.set_friend_status(user_id, friend_id, 0).await?;
        self.push_user_event(
            friend_id,
            user_id,
            user_event_type::FRIEND_DELETED,
            serde_json::json!({}),
            now_ms,
        )
        .await?;
        Ok(())
    }

    async fn push_user_event(
        &self,
        recipient: u64,
        actor_id: u64,
        event_type: &str,
        payload: serde_json::Value,
        now_ms: i64,
    ) -> Result<()> {
        let envelope = serde_json::json!({
            "type": "notification",
            "event_id": 0,
            "room_id": 0,
            "actor_id": actor_id,
            "event_type": event_type,
            "payload": payload,
            "created_at": now_ms,
        });
        let bytes =
            serde_json::to_string(&envelope).map_err(|e| ChatError::Internal(relaychat_store::Error::Json(e)))?;
        self.notifier.send_to_user(recipient, bytes).await;
        Ok(())
    }
}
