use relaychat_protocol::room_type;
use relaychat_store::{Message, Room, Store};
use serde::Serialize;

use crate::error::Result;

/// Excluded from `unread_count`: single-deleted (5) and either-sided-deleted
/// (6, 7). A recalled message (4) still counts toward it — see the matching
/// constant in `relaychat_store::conversations`.
const EXCLUDED_MESSAGE_STATUSES: [i16; 3] = [5, 6, 7];

/// One row of a user's conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    pub room_id: u64,
    pub room_type: i16,
    pub display_name: String,
    pub avatar: String,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub updated_at: i64,
}

/// Builds per-user conversation lists: display-name and avatar resolution,
/// last message, and an always-derived `unread_count` (never a maintained
/// column).
#[derive(Clone)]
pub struct ConversationView {
    store: Store,
}

impl ConversationView {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// List every visible conversation for `user_id`, newest-activity
    /// first ("sorted by `updated_at` desc where
    /// `is_visible=true`").
    pub async fn list(&self, user_id: u64) -> Result<Vec<ConversationItem>> {
        let mut conversations = self.store.list_conversations(user_id).await?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut items = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(room) = self.store.get_room(conversation.room_id).await? else {
                continue;
            };

            let last_message = match conversation.last_message_id {
                Some(id) => self.store.get_message(id).await?,
                None => None,
            };

            let unread_count = self
                .store
                .count_messages_after(
                    room.id,
                    user_id,
                    conversation.last_read_msg_id.unwrap_or(0),
                    &EXCLUDED_MESSAGE_STATUSES,
                )
                .await?;

            let (display_name, avatar) = self.resolve_identity(user_id, &room).await?;

            items.push(ConversationItem {
                room_id: room.id,
                room_type: room.r#type,
                display_name,
                avatar,
                last_message,
                unread_count,
                is_pinned: conversation.is_pinned,
                is_muted: conversation.is_muted,
                updated_at: conversation.updated_at,
            });
        }

        Ok(items)
    }

    /// Display-name precedence: friend remark (private) →
    /// in-room nickname (the viewer's own, for group self-labelling) →
    /// peer nickname (private) / room name (group) → username. Avatar:
    /// peer avatar for private, room avatar for group.
    async fn resolve_identity(&self, user_id: u64, room: &Room) -> Result<(String, String)> {
        if room.r#type == room_type::PRIVATE {
            let members = self.store.list_room_members(room.id).await?;
            let peer_id = members.iter().find(|m| m.user_id != user_id).map(|m| m.user_id);

            let Some(peer_id) = peer_id else {
                return Ok((room.name.clone(), room.avatar.clone()));
            };

            if let Some(friend) = self.store.get_friend(user_id, peer_id).await? {
                if !friend.remark.is_empty() {
                    let avatar = self.peer_avatar(peer_id).await?;
                    return Ok((friend.remark, avatar));
                }
            }

            let peer = self.store.get_user(peer_id).await?;
            let avatar = peer.as_ref().map(|u| u.avatar.clone()).unwrap_or_default();
            let name = peer.map(|u| u.nickname).unwrap_or_default();
            Ok((name, avatar))
        } else {
            let membership = self.store.get_room_user(room.id, user_id).await?;
            if let Some(membership) = membership {
                if !membership.nickname.is_empty() {
                    return Ok((membership.nickname, room.avatar.clone()));
                }
            }
            let name = if room.name.is_empty() {
                self.store
                    .get_user(user_id)
                    .await?
                    .map(|u| u.username)
                    .unwrap_or_default()
            } else {
                room.name.clone()
            };
            Ok((name, room.avatar.clone()))
        }
    }

    async fn peer_avatar(&self, peer_id: u64) -> Result<String> {
        Ok(self
            .store
            .get_user(peer_id)
            .await?
            .map(|u| u.avatar)
            .unwrap_or_default())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use relaychat_store::{NewMessage, User};

    async fn test_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("pool");
        let store = Store::new(pool, "im_");
        store.init().await.expect("init");
        store
    }

    fn user(id: &str, username: &str, nickname: &str) -> User {
        User {
            id: 0,
            uid: id.into(),
            username: username.into(),
            nickname: nickname.into(),
            password_hash: "h".into(),
            avatar: format!("{username}.png"),
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
    async fn friend_remark_wins_over_peer_nickname() {
        let store = test_store().await;
        let alice = store.create_user(&user("u1", "alice", "Alice")).await.unwrap();
        let bob = store.create_user(&user("u2", "bob", "Bob")).await.unwrap();
        let room = store.get_or_create_private_room(alice.id, bob.id).await.unwrap();
        store.add_room_member(room.id, alice.id, 0, "", 0).await.unwrap();
        store.add_room_member(room.id, bob.id, 0, "", 0).await.unwrap();
        store.create_friend_pair(alice.id, bob.id).await.unwrap();
        store.set_friend_remark(alice.id, bob.id, "Bobby").await.unwrap();

        store
            .insert_message(NewMessage {
                room_id: room.id,
                sender_id: bob.id,
                reply_to: None,
                r#type: 1,
                content: "hi",
                extra: &serde_json::Value::Null,
                is_system: false,
                is_encrypted: false,
                status: 1,
                created_at: 0,
            })
            .await
            .unwrap();
        store.touch_conversation_message(alice.id, room.id, 1, 0).await.unwrap();

        let view = ConversationView::new(store);
        let items = view.list(alice.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name, "Bobby");
        assert_eq!(items[0].avatar, "bob.png");
    }

    #[tokio::test]
    async fn group_self_nickname_used_for_display_not_leaked_from_others() {
        let store = test_store().await;
        let room = store.create_group_room("Team", "team.png", 1).await.unwrap();
        store.add_room_member(room.id, 1, 2, "Owner Bob", 0).await.unwrap();
        store.ensure_conversation(1, room.id, 0).await.unwrap();

        let view = ConversationView::new(store);
        let items = view.list(1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name, "Owner Bob");
        assert_eq!(items[0].avatar, "team.png");
    }

    #[tokio::test]
    async fn unread_count_is_derived_from_cursor() {
        let store = test_store().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, 2, "", 0).await.unwrap();
        store.ensure_conversation(1, room.id, 0).await.unwrap();

        for content in ["a", "b", "c"] {
            store
                .insert_message(NewMessage {
                    room_id: room.id,
                    sender_id: 9,
                    reply_to: None,
                    r#type: 1,
                    content,
                    extra: &serde_json::Value::Null,
                    is_system: false,
                    is_encrypted: false,
                    status: 1,
                    created_at: 0,
                })
                .await
                .unwrap();
        }
        store.touch_conversation_message(1, room.id, 3, 0).await.unwrap();
        store.merge_read_cursor(1, room.id, 1, 0).await.unwrap();

        let view = ConversationView::new(store);
        let items = view.list(1).await.unwrap();
        assert_eq!(items[0].unread_count, 2);
    }
}
