//! Room-notification service: durable per-recipient
//! delivery rows for room-membership and moderation events, fanned out
//! live through the session hub's [`relaychat_common::Notifier`] and
//! pullable afterwards for clients that were offline.

mod error;
mod service;

pub use error::{Error, Result};
pub use service::{NotificationService, Page};
