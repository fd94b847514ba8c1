//! Entity types for every table the store owns. Each maps 1:1 onto a
//! `sqlx::FromRow` row; timestamps are unix millis, booleans are stored as
//! `INTEGER` 0/1 and widened in `From<Row>` conversions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub uid: String,
    pub username: String,
    pub nickname: String,
    pub password_hash: String,
    pub avatar: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: i16,
    pub birthday: Option<i64>,
    pub signature: String,
    pub online_status: i16,
    pub last_login_at: Option<i64>,
    pub last_active_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: u64,
    pub room_account: String,
    pub r#type: i16,
    pub name: String,
    pub avatar: String,
    pub creator_id: u64,
    pub last_message_id: Option<u64>,
    pub mute_flag: bool,
    pub mute_until: Option<i64>,
    pub daily_mute_start: Option<String>,
    pub daily_mute_duration_min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomUser {
    pub room_id: u64,
    pub user_id: u64,
    pub role: i16,
    pub nickname: String,
    pub is_muted: bool,
    pub muted_until: Option<i64>,
    pub join_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: u64,
    pub room_id: u64,
    pub sender_id: u64,
    pub reply_to: Option<u64>,
    pub r#type: i16,
    pub content: String,
    pub extra: serde_json::Value,
    pub is_system: bool,
    pub is_encrypted: bool,
    pub status: i16,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageStatus {
    pub message_id: u64,
    pub user_id: u64,
    pub room_id: u64,
    pub is_read: bool,
    pub is_deleted: bool,
    pub read_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub user_id: u64,
    pub room_id: u64,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub is_visible: bool,
    pub last_read_msg_id: Option<u64>,
    pub last_message_id: Option<u64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(i16)]
pub enum FriendStatus {
    Normal = 1,
    Blocked = 2,
}

impl FriendStatus {
    pub fn from_i16(v: i16) -> Self {
        if v == 2 { Self::Blocked } else { Self::Normal }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friend {
    pub user_id: u64,
    pub friend_id: u64,
    pub remark: String,
    pub group_name: String,
    pub is_star: bool,
    pub is_muted: bool,
    pub status: i16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(i16)]
pub enum ApplyStatus {
    Pending = 0,
    Agreed = 1,
    Refused = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendApply {
    pub id: u64,
    pub from_user: u64,
    pub to_user: u64,
    pub reason: String,
    pub status: i16,
    pub processed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomNotification {
    pub id: u64,
    pub room_id: u64,
    pub actor_id: u64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomNotificationDelivery {
    pub id: u64,
    pub user_id: u64,
    pub event_id: u64,
    pub room_id: u64,
    pub is_read: bool,
    pub read_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomNotice {
    pub room_id: u64,
    pub actor_id: u64,
    pub title: String,
    pub content: String,
    pub is_pinned: bool,
}
