use chrono_tz::Tz;
use relaychat_protocol::role;
use relaychat_store::{Room, RoomUser};

use crate::{
    error::{PolicyError, Result},
    mute::evaluate_mute,
};

/// Gate for an inbound send.
///
/// Owners/admins bypass mute windows entirely, but not the block check —
/// block is evaluated by the caller against the `Friend` table (this crate
/// has no notion of friendship, only of room membership and mute state) and
/// passed in as `blocked`.
pub fn can_send(
    room: &Room,
    membership: Option<&RoomUser>,
    blocked: bool,
    now_ms: i64,
    tz: Tz,
) -> Result<()> {
    let member = membership.ok_or(PolicyError::NotMember)?;
    if blocked {
        return Err(PolicyError::Blocked);
    }
    if member.role >= role::ADMIN {
        return Ok(());
    }
    if let Some(window) = evaluate_mute(room, member, now_ms, tz) {
        return Err(PolicyError::Muted(window));
    }
    Ok(())
}

/// Gate for `recall` (kind=4): only the sender, within the recall window.
pub fn can_recall(
    message_sender_id: u64,
    operator_id: u64,
    created_at_ms: i64,
    now_ms: i64,
    window_secs: i64,
) -> Result<()> {
    if message_sender_id != operator_id {
        return Err(PolicyError::Permission("only own".into()));
    }
    let elapsed_secs = (now_ms - created_at_ms) / 1000;
    if elapsed_secs > window_secs {
        return Err(PolicyError::Permission("window expired".into()));
    }
    Ok(())
}

/// Gate for `both_delete` (kind=6) as the message's own sender.
pub fn can_both_delete_as_sender(message_sender_id: u64, operator_id: u64) -> Result<()> {
    if message_sender_id != operator_id {
        return Err(PolicyError::Permission("only own".into()));
    }
    Ok(())
}

/// Gate for the admin `both_delete` path (kind=7): any member with
/// `role ≥ 1` may invoke it regardless of who sent the message.
pub fn can_both_delete_as_admin(operator_role: i16) -> Result<()> {
    crate::gates::require_role_at_least(operator_role, role::ADMIN)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn room(mute_flag: bool, mute_until: Option<i64>) -> Room {
        Room {
            id: 1,
            room_account: "group_1".into(),
            r#type: relaychat_protocol::room_type::GROUP,
            name: String::new(),
            avatar: String::new(),
            creator_id: 1,
            last_message_id: None,
            mute_flag,
            mute_until,
            daily_mute_start: None,
            daily_mute_duration_min: 0,
        }
    }

    fn member(role: i16, is_muted: bool, muted_until: Option<i64>) -> RoomUser {
        RoomUser {
            room_id: 1,
            user_id: 2,
            role,
            nickname: String::new(),
            is_muted,
            muted_until,
            join_time: 0,
        }
    }

    #[test]
    fn room_mute_countdown_rejects_member_not_admin() {
        let room = room(true, Some(5 * 60 * 1000));
        let member = member(0, false, None);
        let result = can_send(&room, Some(&member), false, 0, chrono_tz::UTC);
        assert!(matches!(result, Err(PolicyError::Muted(_))));
    }

    #[test]
    fn room_mute_countdown_expires() {
        let room = room(true, Some(5 * 60 * 1000));
        let member = member(0, false, None);
        let result = can_send(&room, Some(&member), false, 301_000, chrono_tz::UTC);
        assert!(result.is_ok());
    }

    #[test]
    fn owner_bypasses_mute() {
        let room = room(true, Some(i64::MAX));
        let owner = member(role::OWNER, false, None);
        assert!(can_send(&room, Some(&owner), false, 0, chrono_tz::UTC).is_ok());
    }

    #[test]
    fn non_member_is_rejected() {
        let room = room(false, None);
        assert!(matches!(
            can_send(&room, None, false, 0, chrono_tz::UTC),
            Err(PolicyError::NotMember)
        ));
    }

    #[test]
    fn block_takes_priority_even_for_admin() {
        let room = room(false, None);
        let admin = member(role::ADMIN, false, None);
        assert!(matches!(
            can_send(&room, Some(&admin), true, 0, chrono_tz::UTC),
            Err(PolicyError::Blocked)
        ));
    }

    #[test]
    fn recall_window_boundary_is_inclusive() {
        assert!(can_recall(1, 1, 0, 120_000, 120).is_ok());
        assert!(can_recall(1, 1, 0, 121_000, 120).is_err());
    }

    #[test]
    fn recall_rejects_other_users_message() {
        assert!(can_recall(1, 2, 0, 0, 120).is_err());
    }
}
