//! Messaging policy engine: role gates, mute-window
//! evaluation (per-user, room-wide countdown, daily-recurring), private
//! block and recall-window checks. Pure functions over plain data — no I/O,
//! no session or DB coupling.

mod error;
mod gates;
mod mute;
mod policy;

pub use error::{PolicyError, Result};
pub use gates::{require_can_act_on, require_owner, require_role_at_least};
pub use mute::MuteWindow;
pub use policy::{can_both_delete_as_admin, can_both_delete_as_sender, can_recall, can_send};
