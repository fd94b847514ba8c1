//! Typed CRUD over the chat graph: users, rooms,
//! memberships, messages, friendships, conversations and room
//! notifications. Table names are assembled at runtime behind a
//! configurable prefix, so every query here uses `sqlx::query`/`query_as`
//! rather than the compile-time `sqlx::query!` macros — the same choice the
//! teacher's stores make to avoid a build-time `DATABASE_URL`.

mod conversations;
mod error;
mod friend_applies;
mod friends;
mod message_status;
mod messages;
mod notices;
mod notifications;
mod room_users;
mod rooms;
mod store;
mod types;
mod users;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use messages::NewMessage;
pub use notifications::PublishedNotification;
pub use rooms::private_room_account;
pub use store::Store;
pub use types::{
    ApplyStatus, Conversation, Friend, FriendApply, FriendStatus, Message, MessageStatus, Room,
    RoomNotice, RoomNotification, RoomNotificationDelivery, RoomUser, User,
};
