use std::sync::Arc;

use relaychat_common::Notifier;
use relaychat_policy::can_send;
use relaychat_protocol::{message_status, room_type, MessageEnvelope};
use relaychat_session::{IdentitySnapshot, UserSession};
use relaychat_store::{NewMessage, Store};
use tokio::sync::RwLock;

use crate::error::{ChatError, Result};

/// Ingress/egress pipeline: parse → classify →
/// authorize → persist → envelope → fan-out → conversation update.
///
/// Holds references to its collaborators directly rather than through any
/// dynamic dispatch over the pipeline steps themselves.
#[derive(Clone)]
pub struct ChatService {
    store: Store,
    notifier: Arc<dyn Notifier>,
    tz: chrono_tz::Tz,
}

impl ChatService {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>, tz: chrono_tz::Tz) -> Self {
        Self {
            store,
            notifier,
            tz,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn tz(&self) -> chrono_tz::Tz {
        self.tz
    }

    /// `read_ack` path: merge into C3 using `max`. No DB
    /// write here — flush to the conversation cursor is C7's job
    /// ([`crate::read_receipts::flush_user`]).
    pub async fn handle_read_ack(
        &self,
        user_state: &Arc<RwLock<UserSession>>,
        room_id: u64,
        last_read_msg_id: u64,
    ) -> u64 {
        user_state.write().await.merge_read(room_id, last_read_msg_id)
    }

    /// `message` path.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_send(
        &self,
        sender_id: u64,
        identity: &IdentitySnapshot,
        user_state: &Arc<RwLock<UserSession>>,
        room_id: u64,
        msg_type: u8,
        content: &str,
        extra: serde_json::Value,
        packet_id: Option<String>,
        now_ms: i64,
    ) -> Result<MessageEnvelope> {
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {room_id}")))?;

        let membership = self.store.get_room_user(room.id, sender_id).await?;

        let blocked = if room.r#type == room_type::PRIVATE {
            match self.private_peer(room.id, sender_id).await? {
                Some(peer_id) => self.store.is_blocked(sender_id, peer_id).await?,
                None => false,
            }
        } else {
            false
        };

        can_send(&room, membership.as_ref(), blocked, now_ms, self.tz)?;

        let envelope = self
            .persist_and_fanout(
                &room,
                sender_id,
                identity,
                msg_type,
                content,
                extra,
                false,
                false,
                message_status::SENT,
                packet_id,
                now_ms,
            )
            .await?;

        user_state.write().await.merge_read(room.id, envelope.id);

        Ok(envelope)
    }

    /// Inject a message into `room_id` authored by `operator_id`, gated only
    /// by mute state (no block check) — used by the recall/forward engine
    /// ("run through C4 mute gate per target room") for both
    /// single-forward copies and merge-forward summaries.
    #[allow(clippy::too_many_arguments)]
    pub async fn forward_copy(
        &self,
        room_id: u64,
        operator_id: u64,
        identity: &IdentitySnapshot,
        msg_type: u8,
        content: &str,
        extra: serde_json::Value,
        is_system: bool,
        is_encrypted: bool,
        now_ms: i64,
    ) -> Result<MessageEnvelope> {
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {room_id}")))?;
        let membership = self.store.get_room_user(room.id, operator_id).await?;
        can_send(&room, membership.as_ref(), false, now_ms, self.tz)?;

        self.persist_and_fanout(
            &room,
            operator_id,
            identity,
            msg_type,
            content,
            extra,
            is_system,
            is_encrypted,
            message_status::SENT,
            None,
            now_ms,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_and_fanout(
        &self,
        room: &relaychat_store::Room,
        sender_id: u64,
        identity: &IdentitySnapshot,
        msg_type: u8,
        content: &str,
        extra: serde_json::Value,
        is_system: bool,
        is_encrypted: bool,
        status: i16,
        packet_id: Option<String>,
        now_ms: i64,
    ) -> Result<MessageEnvelope> {
        let new_message = NewMessage {
            room_id: room.id,
            sender_id,
            reply_to: None,
            r#type: msg_type as i16,
            content,
            extra: &extra,
            is_system,
            is_encrypted,
            status,
            created_at: now_ms,
        };
        let message = self.store.insert_message(new_message).await?;
        self.store.set_last_message(room.id, message.id).await?;

        let envelope = MessageEnvelope {
            r#type: MessageEnvelope::type_tag(),
            packet_id,
            id: message.id,
            room_id: room.id,
            room_type: room.r#type,
            sender_id,
            sender_nickname: identity.nickname.clone(),
            sender_avatar: identity.avatar.clone(),
            msg_type,
            content: message.content.clone(),
            extra: message.extra.clone(),
            created_at: message.created_at,
        };

        let members = self.store.list_room_members(room.id).await?;
        let envelope_json =
            serde_json::to_string(&envelope).map_err(|e| ChatError::Internal(relaychat_store::Error::Json(e)))?;
        for member in &members {
            self.store
                .touch_conversation_message(member.user_id, room.id, message.id, now_ms)
                .await?;
            // Sender receives its own fan-out, paired with the packet_id
            // echo as a delivery receipt.
            self.notifier
                .send_to_user(member.user_id, envelope_json.clone())
                .await;
        }

        Ok(envelope)
    }

    async fn private_peer(&self, room_id: u64, user_id: u64) -> Result<Option<u64>> {
        let members = self.store.list_room_members(room_id).await?;
        Ok(members
            .into_iter()
            .find(|m| m.user_id != user_id)
            .map(|m| m.user_id))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::Mutex;

    use super::*;

    struct RecordingNotifier {
        sent: Mutex<Vec<(u64, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_to_user(&self, user_id: u64, bytes: String) {
            self.sent.lock().await.push((user_id, bytes));
        }
    }

    async fn test_service() -> (ChatService, Arc<RecordingNotifier>, Store) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("pool");
        let store = Store::new(pool, "im_");
        store.init().await.expect("init");
        let notifier = Arc::new(RecordingNotifier {
            sent: Mutex::new(Vec::new()),
        });
        let service = ChatService::new(store.clone(), notifier.clone(), chrono_tz::UTC);
        (service, notifier, store)
    }

    #[tokio::test]
    async fn private_send_blocked_by_friend_status() {
        let (service, notifier, store) = test_service().await;
        store.create_friend_pair(10, 20).await.unwrap();
        store.set_friend_status(10, 20, 2).await.unwrap();
        let room = store.get_or_create_private_room(10, 20).await.unwrap();
        store.add_room_member(room.id, 10, 0, "", 0).await.unwrap();
        store.add_room_member(room.id, 20, 0, "", 0).await.unwrap();

        let user_state = Arc::new(RwLock::new(UserSession::default()));
        let result = service
            .handle_send(
                10,
                &IdentitySnapshot::default(),
                &user_state,
                room.id,
                1,
                "hi",
                serde_json::Value::Null,
                None,
                0,
            )
            .await;

        assert!(matches!(result, Err(ChatError::Policy(_))));
        assert!(store.get_messages(&[1]).await.unwrap().is_empty());
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn group_mute_countdown_then_expiry() {
        let (service, _notifier, store) = test_service().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, 2, "owner", 0).await.unwrap();
        store.add_room_member(room.id, 2, 0, "member", 0).await.unwrap();
        store
            .set_room_member_mute(room.id, 2, true, Some(5 * 60 * 1000))
            .await
            .unwrap();

        let user_state = Arc::new(RwLock::new(UserSession::default()));
        let rejected = service
            .handle_send(
                2,
                &IdentitySnapshot::default(),
                &user_state,
                room.id,
                1,
                "hi",
                serde_json::Value::Null,
                None,
                0,
            )
            .await;
        assert!(matches!(rejected, Err(ChatError::Policy(_))));

        let accepted = service
            .handle_send(
                2,
                &IdentitySnapshot::default(),
                &user_state,
                room.id,
                1,
                "hi",
                serde_json::Value::Null,
                None,
                301_000,
            )
            .await;
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn send_makes_every_members_conversation_visible() {
        let (service, _notifier, store) = test_service().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, 2, "owner", 0).await.unwrap();
        store.add_room_member(room.id, 2, 0, "member", 0).await.unwrap();
        store.ensure_conversation(2, room.id, 0).await.unwrap();
        store.set_conversation_visible(2, room.id, false, 0).await.unwrap();

        let user_state = Arc::new(RwLock::new(UserSession::default()));
        service
            .handle_send(
                1,
                &IdentitySnapshot::default(),
                &user_state,
                room.id,
                1,
                "hi",
                serde_json::Value::Null,
                None,
                0,
            )
            .await
            .unwrap();

        let conversations = store.list_conversations(2).await.unwrap();
        assert_eq!(conversations.len(), 1);
    }
}
