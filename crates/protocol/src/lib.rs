//! Wire protocol for the realtime session channel.
//!
//! All communication over the session channel is JSON frames:
//! - inbound: `message` (send) and `read_ack` (cursor advance)
//! - outbound: `message` (delivery), `notification` (room events),
//!   `error` (synchronous rejection)

use serde::{Deserialize, Serialize};

// ── Limits ───────────────────────────────────────────────────────────────────

/// Default maximum inbound frame size. The canonical implementation used
/// 512 B; this may be lifted by the embedder.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4096;
/// Per-connection outbound queue depth before envelopes are dropped.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;
/// Read deadline for an idle connection.
pub const READ_DEADLINE_SECS: u64 = 60;
/// Heartbeat interval, 0.9x the read deadline.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 54;
/// Write deadline for a single outbound batch.
pub const WRITE_DEADLINE_SECS: u64 = 10;
/// Recall window: a message may be recalled by its sender within this long.
pub const RECALL_WINDOW_SECS: i64 = 120;

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const INPUT_INVALID: &str = "INPUT_INVALID";
    pub const AUTH: &str = "AUTH";
    pub const PERMISSION: &str = "PERMISSION";
    pub const CONFLICT: &str = "CONFLICT";
    pub const POLICY: &str = "POLICY";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL: &str = "INTERNAL";
}

// ── send_type codes ──────────────────────────────────────────────────────────

pub mod send_type {
    pub const TEXT: u8 = 1;
    pub const IMAGE: u8 = 2;
    pub const VOICE: u8 = 3;
    pub const VIDEO: u8 = 4;
    pub const FILE: u8 = 5;
    pub const LOCATION: u8 = 6;
    pub const QUOTE: u8 = 7;
    pub const MENTION: u8 = 8;
}

// ── Message status codes (§3) ────────────────────────────────────────────────

pub mod message_status {
    pub const SENDING: i16 = 0;
    pub const SENT: i16 = 1;
    pub const DELIVERED: i16 = 2;
    pub const READ: i16 = 3;
    pub const RECALLED: i16 = 4;
    pub const SINGLE_DELETED: i16 = 5;
    pub const BOTH_DELETED_BY_SENDER: i16 = 6;
    pub const BOTH_DELETED_BY_ADMIN: i16 = 7;
}

// ── Room-notification event types (§4.5, closed set) ────────────────────────

pub mod event_type {
    pub const GROUP_INFO_UPDATED: &str = "room.group.info_updated";
    pub const ADMIN_SET: &str = "room.admin.set";
    pub const MUTE_COUNTDOWN: &str = "room.group.mute.countdown";
    pub const MUTE_SCHEDULED: &str = "room.group.mute.scheduled";
    pub const USER_MUTE: &str = "room.user.mute";
    pub const MEMBER_ADDED: &str = "room.member.added";
    pub const MEMBER_REMOVED: &str = "room.member.removed";
    pub const MEMBER_QUIT: &str = "room.member.quit";
    pub const NOTICE_SET: &str = "room.notice.set";
}

/// User-level envelopes delivered via the session channel only (no
/// delivery-table persistence).
pub mod user_event_type {
    pub const FORWARD: &str = "forward";
    pub const MERGE_FORWARD: &str = "merge_forward";
    pub const RECALL: &str = "recall";
    pub const FRIEND_REQUEST: &str = "friend_request";
    pub const FRIEND_ACCEPTED: &str = "friend_accepted";
    pub const FRIEND_REJECTED: &str = "friend_rejected";
    pub const FRIEND_DELETED: &str = "friend_deleted";
}

// ── Room / role constants ────────────────────────────────────────────────────

pub mod room_type {
    pub const PRIVATE: i16 = 1;
    pub const GROUP: i16 = 2;
}

pub mod role {
    pub const MEMBER: i16 = 0;
    pub const ADMIN: i16 = 1;
    pub const OWNER: i16 = 2;
}

/// Kinds accepted by the batch recall/delete operation (§4.4).
pub mod recall_kind {
    pub const RECALL: i16 = 4;
    pub const SINGLE_DELETE: i16 = 5;
    pub const BOTH_DELETE: i16 = 6;
    pub const BOTH_DELETE_BY_ADMIN: i16 = 7;
}

// ── Inbound frame (§6) ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Message(InboundMessage),
    ReadAck(ReadAck),
}

impl InboundFrame {
    /// Parse a raw inbound frame, defaulting the `type` field to `message`
    /// when absent ("Classification by `type` (default
    /// `message`)").
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        if let Some(obj) = value.as_object_mut() {
            obj.entry("type")
                .or_insert_with(|| serde_json::Value::String("message".into()));
        }
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub send_to: u64,
    pub send_type: u8,
    pub send_content: String,
    #[serde(default)]
    pub extra: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAck {
    pub room_id: u64,
    pub last_read_msg_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_id: Option<String>,
}

// ── Outbound envelopes (§6) ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub r#type: &'static str, // always "message"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_id: Option<String>,
    pub id: u64,
    pub room_id: u64,
    pub room_type: i16,
    pub sender_id: u64,
    pub sender_nickname: String,
    pub sender_avatar: String,
    pub msg_type: u8,
    pub content: String,
    pub extra: serde_json::Value,
    pub created_at: i64,
}

impl MessageEnvelope {
    pub fn type_tag() -> &'static str {
        "message"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub r#type: &'static str, // always "notification"
    pub event_id: u64,
    pub room_id: u64,
    pub actor_id: u64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub r#type: &'static str, // always "error"
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_id: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            r#type: "error",
            message: message.into(),
            packet_id: None,
        }
    }

    pub fn with_packet_id(mut self, packet_id: Option<String>) -> Self {
        self.packet_id = packet_id;
        self
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_defaults_to_message() {
        let raw = r#"{"send_to":1,"send_type":1,"send_content":"hi"}"#;
        let frame = InboundFrame::parse(raw).unwrap();
        match frame {
            InboundFrame::Message(m) => {
                assert_eq!(m.send_to, 1);
                assert_eq!(m.send_content, "hi");
            },
            InboundFrame::ReadAck(_) => panic!("expected message"),
        }
    }

    #[test]
    fn inbound_frame_read_ack() {
        let raw = r#"{"type":"read_ack","room_id":5,"last_read_msg_id":42}"#;
        let frame = InboundFrame::parse(raw).unwrap();
        match frame {
            InboundFrame::ReadAck(a) => {
                assert_eq!(a.room_id, 5);
                assert_eq!(a.last_read_msg_id, 42);
            },
            InboundFrame::Message(_) => panic!("expected read_ack"),
        }
    }

    #[test]
    fn error_envelope_serializes_type_tag() {
        let err = ErrorEnvelope::new("blocked");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "blocked");
    }
}
