use std::collections::{BTreeSet, HashMap};

use relaychat_policy::{can_both_delete_as_admin, can_both_delete_as_sender, can_recall};
use relaychat_protocol::{message_status, recall_kind, user_event_type, MessageEnvelope, NotificationEnvelope};
use relaychat_session::IdentitySnapshot;

use crate::error::{ChatError, Result};
use crate::ingress::ChatService;

/// Result of a batch recall/delete request: ids that
/// succeeded, and a per-id reason for the ones that didn't. Never fails the
/// whole batch for one bad id.
#[derive(Debug, Default)]
pub struct RecallOutcome {
    pub succeeded: Vec<u64>,
    pub failed: HashMap<u64, String>,
}

/// One target room's result of a forward.
pub struct ForwardedMessage {
    pub room_id: u64,
    pub envelope: MessageEnvelope,
}

/// Recall/forward engine. Delegates persistence and the
/// mute gate to [`ChatService`] so both components share one insertion and
/// fan-out path; adds recall-window and ownership checks plus the
/// recall/forward notification shapes on top.
pub struct RecallForwardService {
    chat: ChatService,
    recall_window_secs: i64,
}

impl RecallForwardService {
    pub fn new(chat: ChatService, recall_window_secs: i64) -> Self {
        Self {
            chat,
            recall_window_secs,
        }
    }

    /// `{message_ids[], operator_id, kind}`. Ids are
    /// deduplicated; each is evaluated independently so one failure never
    /// blocks the rest. All DB writes happen as the per-id operations run;
    /// grouping the notification per room happens once all ids are
    /// processed.
    pub async fn batch_recall_delete(
        &self,
        operator_id: u64,
        operator_role_in_room: impl Fn(u64) -> i16,
        message_ids: &[u64],
        kind: i16,
        now_ms: i64,
    ) -> Result<RecallOutcome> {
        let mut outcome = RecallOutcome::default();
        let mut to_notify: HashMap<u64, Vec<u64>> = HashMap::new();

        for message_id in message_ids.iter().copied().collect::<BTreeSet<_>>() {
            let Some(message) = self.chat.store().get_message(message_id).await? else {
                outcome.failed.insert(message_id, "not found".into());
                continue;
            };

            // Wrapped in its own async block so a `?` inside any arm only
            // short-circuits this one message's outcome, not the whole batch.
            let result: Result<()> = async {
                match kind {
                    recall_kind::RECALL => {
                        can_recall(
                            message.sender_id,
                            operator_id,
                            message.created_at,
                            now_ms,
                            self.recall_window_secs,
                        )?;
                        self.chat
                            .store()
                            .set_message_status(message.id, message_status::RECALLED)
                            .await?;
                        Ok(())
                    },
                    recall_kind::SINGLE_DELETE => {
                        self.chat
                            .store()
                            .ensure_message_status(message.id, operator_id, message.room_id)
                            .await?;
                        self.chat
                            .store()
                            .mark_message_deleted(message.id, operator_id)
                            .await?;
                        Ok(())
                    },
                    recall_kind::BOTH_DELETE => {
                        can_both_delete_as_sender(message.sender_id, operator_id)?;
                        self.chat
                            .store()
                            .set_message_status(message.id, message_status::BOTH_DELETED_BY_SENDER)
                            .await?;
                        Ok(())
                    },
                    recall_kind::BOTH_DELETE_BY_ADMIN => {
                        can_both_delete_as_admin(operator_role_in_room(message.room_id))?;
                        self.chat
                            .store()
                            .set_message_status(message.id, message_status::BOTH_DELETED_BY_ADMIN)
                            .await?;
                        Ok(())
                    },
                    other => Err(ChatError::InputInvalid(format!("unknown recall kind {other}"))),
                }
            }
            .await;

            match result {
                Ok(()) => {
                    outcome.succeeded.push(message_id);
                    // single_delete is intentionally silent — no notification fan-out.
                    if kind != recall_kind::SINGLE_DELETE {
                        to_notify.entry(message.room_id).or_default().push(message_id);
                    }
                },
                Err(err) => {
                    outcome.failed.insert(message_id, err.user_message());
                },
            }
        }

        for (room_id, ids) in to_notify {
            self.notify_recall(room_id, operator_id, &ids, kind, now_ms).await?;
        }

        Ok(outcome)
    }

    async fn notify_recall(
        &self,
        room_id: u64,
        operator_id: u64,
        message_ids: &[u64],
        kind: i16,
        now_ms: i64,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "recall_type": kind,
            "message_ids": message_ids,
            "room_id": room_id,
            "operator_id": operator_id,
        });
        self.push_user_event(room_id, operator_id, user_event_type::RECALL, payload, now_ms)
            .await
    }

    /// `single` forward mode: optional system comment, then
    /// one fresh copy per source message per target room.
    pub async fn forward_single(
        &self,
        operator_id: u64,
        identity: &IdentitySnapshot,
        source_message_ids: &[u64],
        target_rooms: &[u64],
        comment: Option<&str>,
        now_ms: i64,
    ) -> Result<Vec<ForwardedMessage>> {
        let sources = self.chat.store().get_messages(source_message_ids).await?;
        let mut forwarded = Vec::new();

        for &room_id in target_rooms {
            if let Some(comment) = comment {
                self.chat
                    .forward_copy(
                        room_id,
                        operator_id,
                        identity,
                        relaychat_protocol::send_type::TEXT,
                        comment,
                        serde_json::Value::Null,
                        true,
                        false,
                        now_ms,
                    )
                    .await?;
            }
            for source in &sources {
                let envelope = self
                    .chat
                    .forward_copy(
                        room_id,
                        operator_id,
                        identity,
                        source.r#type as u8,
                        &source.content,
                        source.extra.clone(),
                        source.is_system,
                        source.is_encrypted,
                        now_ms,
                    )
                    .await?;
                forwarded.push(ForwardedMessage { room_id, envelope });
            }
            let payload = serde_json::json!({
                "message_ids": source_message_ids,
                "from_room_id": source_message_ids.first().and_then(|_| sources.first()).map(|m| m.room_id),
            });
            self.push_user_event(room_id, operator_id, user_event_type::FORWARD, payload, now_ms)
                .await?;
        }

        Ok(forwarded)
    }

    /// `merge` forward mode: one summary Message per target
    /// room whose `extra` carries the structured `merge_forward` payload,
    /// preserving source order.
    pub async fn forward_merge(
        &self,
        operator_id: u64,
        identity: &IdentitySnapshot,
        title: &str,
        source_message_ids: &[u64],
        target_rooms: &[u64],
        comment: Option<&str>,
        now_ms: i64,
    ) -> Result<Vec<ForwardedMessage>> {
        let mut by_id = HashMap::new();
        for message in self.chat.store().get_messages(source_message_ids).await? {
            by_id.insert(message.id, message);
        }
        let items: Vec<_> = source_message_ids
            .iter()
            .filter_map(|id| by_id.get(id))
            .map(|m| {
                serde_json::json!({
                    "id": m.id,
                    "room_id": m.room_id,
                    "sender_id": m.sender_id,
                    "type": m.r#type,
                    "content": m.content,
                    "extra": m.extra,
                    "created_at": m.created_at,
                })
            })
            .collect();

        let content = format!("[merged forward] {} messages", items.len());
        let extra = serde_json::json!({
            "type": "merge_forward",
            "title": title,
            "from": source_message_ids.first().and_then(|_| by_id.values().next()).map(|m| m.room_id),
            "count": items.len(),
            "items": items,
            "comment": comment,
        });

        let mut forwarded = Vec::new();
        for &room_id in target_rooms {
            let envelope = self
                .chat
                .forward_copy(
                    room_id,
                    operator_id,
                    identity,
                    relaychat_protocol::send_type::TEXT,
                    &content,
                    extra.clone(),
                    false,
                    false,
                    now_ms,
                )
                .await?;
            forwarded.push(ForwardedMessage { room_id, envelope: envelope.clone() });

            let payload = serde_json::json!({
                "title": title,
                "count": items.len(),
                "items": items,
                "comment": comment,
            });
            self.push_user_event(room_id, operator_id, user_event_type::MERGE_FORWARD, payload, now_ms)
                .await?;
        }

        Ok(forwarded)
    }

    async fn push_user_event(
        &self,
        room_id: u64,
        actor_id: u64,
        event_type: &str,
        payload: serde_json::Value,
        now_ms: i64,
    ) -> Result<()> {
        // User-level envelopes (forward/merge_forward/recall) are delivered
        // live only, with no delivery-table persistence.
        let envelope = NotificationEnvelope {
            r#type: "notification",
            event_id: 0,
            room_id,
            actor_id,
            event_type: event_type.to_string(),
            payload,
            created_at: now_ms,
        };
        let bytes = serde_json::to_string(&envelope)
            .map_err(|e| ChatError::Internal(relaychat_store::Error::Json(e)))?;
        let members = self.chat.store().list_room_members(room_id).await?;
        for member in members {
            self.chat.notifier().send_to_user(member.user_id, bytes.clone()).await;
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use relaychat_common::Notifier;
    use relaychat_protocol::recall_kind;
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::Mutex;

    use super::*;
    use crate::ingress::ChatService;

    struct NullNotifier;
    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send_to_user(&self, _user_id: u64, _bytes: String) {}
    }

    struct CountingNotifier {
        count: Mutex<usize>,
    }
    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_to_user(&self, _user_id: u64, _bytes: String) {
            *self.count.lock().await += 1;
        }
    }

    async fn test_store() -> relaychat_store::Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("pool");
        let store = relaychat_store::Store::new(pool, "im_");
        store.init().await.expect("init");
        store
    }

    #[tokio::test]
    async fn batch_recall_partial_failure() {
        let store = test_store().await;
        let room = store.create_group_room("g", "", 5).await.unwrap();
        store.add_room_member(room.id, 5, 2, "owner", 0).await.unwrap();
        store.add_room_member(room.id, 99, 0, "other", 0).await.unwrap();

        let own_recent = store
            .insert_message(relaychat_store::NewMessage {
                room_id: room.id,
                sender_id: 5,
                reply_to: None,
                r#type: 1,
                content: "a",
                extra: &serde_json::Value::Null,
                is_system: false,
                is_encrypted: false,
                status: 1,
                created_at: 0,
            })
            .await
            .unwrap();
        let others = store
            .insert_message(relaychat_store::NewMessage {
                room_id: room.id,
                sender_id: 99,
                reply_to: None,
                r#type: 1,
                content: "b",
                extra: &serde_json::Value::Null,
                is_system: false,
                is_encrypted: false,
                status: 1,
                created_at: 0,
            })
            .await
            .unwrap();
        let own_stale = store
            .insert_message(relaychat_store::NewMessage {
                room_id: room.id,
                sender_id: 5,
                reply_to: None,
                r#type: 1,
                content: "c",
                extra: &serde_json::Value::Null,
                is_system: false,
                is_encrypted: false,
                status: 1,
                created_at: 0,
            })
            .await
            .unwrap();

        let chat = ChatService::new(store.clone(), Arc::new(NullNotifier), chrono_tz::UTC);
        let service = RecallForwardService::new(chat, 120);

        let outcome = service
            .batch_recall_delete(
                5,
                |_room_id| 2,
                &[own_recent.id, others.id, own_stale.id],
                recall_kind::RECALL,
                600_000, // 600s after the epoch-0 created_at
            )
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, vec![own_recent.id]);
        assert_eq!(outcome.failed.len(), 2);

        let refreshed = store.get_message(own_recent.id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, message_status::RECALLED);
        let unaffected = store.get_message(others.id).await.unwrap().unwrap();
        assert_eq!(unaffected.status, 1);
    }

    #[tokio::test]
    async fn single_delete_sends_no_notification() {
        let store = test_store().await;
        let room = store.create_group_room("g", "", 1).await.unwrap();
        store.add_room_member(room.id, 1, 2, "owner", 0).await.unwrap();
        let message = store
            .insert_message(relaychat_store::NewMessage {
                room_id: room.id,
                sender_id: 1,
                reply_to: None,
                r#type: 1,
                content: "a",
                extra: &serde_json::Value::Null,
                is_system: false,
                is_encrypted: false,
                status: 1,
                created_at: 0,
            })
            .await
            .unwrap();

        let notifier = Arc::new(CountingNotifier {
            count: Mutex::new(0),
        });
        let chat = ChatService::new(store.clone(), notifier.clone(), chrono_tz::UTC);
        let service = RecallForwardService::new(chat, 120);

        let outcome = service
            .batch_recall_delete(1, |_| 2, &[message.id], recall_kind::SINGLE_DELETE, 0)
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, vec![message.id]);
        assert_eq!(*notifier.count.lock().await, 0);
        let status = store.get_message_status(message.id, 1).await.unwrap().unwrap();
        assert!(status.is_deleted);
    }

    #[tokio::test]
    async fn merge_forward_preserves_order_and_fans_one_message_per_target() {
        let store = test_store().await;
        let source = store.create_group_room("src", "", 3).await.unwrap();
        let target_b = store.create_group_room("b", "", 3).await.unwrap();
        let target_c = store.create_group_room("c", "", 3).await.unwrap();
        for room in [&source, &target_b, &target_c] {
            store.add_room_member(room.id, 3, 2, "op", 0).await.unwrap();
        }

        let mut ids = Vec::new();
        for content in ["one", "two", "three"] {
            let message = store
                .insert_message(relaychat_store::NewMessage {
                    room_id: source.id,
                    sender_id: 3,
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
            ids.push(message.id);
        }

        let chat = ChatService::new(store.clone(), Arc::new(NullNotifier), chrono_tz::UTC);
        let service = RecallForwardService::new(chat, 120);

        let forwarded = service
            .forward_merge(
                3,
                &IdentitySnapshot::default(),
                "digest",
                &ids,
                &[target_b.id, target_c.id],
                Some("see this"),
                0,
            )
            .await
            .unwrap();

        assert_eq!(forwarded.len(), 2);
        for fm in &forwarded {
            assert_eq!(fm.envelope.extra["type"], "merge_forward");
            let items = fm.envelope.extra["items"].as_array().unwrap();
            assert_eq!(items.len(), 3);
            assert_eq!(items[0]["content"], "one");
            assert_eq!(items[2]["content"], "three");
        }
    }
}
