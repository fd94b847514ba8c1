use relaychat_protocol::role;

use crate::error::{PolicyError, Result};

/// Role gate for admin/owner-only operations: add/remove member, set mute,
/// update group info, publish notice.
pub fn require_role_at_least(actor_role: i16, required: i16) -> Result<()> {
    if actor_role < required {
        return Err(PolicyError::Permission(format!(
            "role >= {required} required"
        )));
    }
    Ok(())
}

/// Setting a member's role to admin requires owner (`role = 2`).
pub fn require_owner(actor_role: i16) -> Result<()> {
    require_role_at_least(actor_role, role::OWNER)
}

/// An actor can never act on a target whose role is equal to or higher than
/// their own.
pub fn require_can_act_on(actor_role: i16, target_role: i16) -> Result<()> {
    if target_role >= actor_role {
        return Err(PolicyError::Permission(
            "cannot act on equal-or-higher role".into(),
        ));
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_gate_rejects_below_required() {
        assert!(require_role_at_least(0, role::ADMIN).is_err());
        assert!(require_role_at_least(role::ADMIN, role::ADMIN).is_ok());
    }

    #[test]
    fn cannot_act_on_equal_or_higher_role() {
        assert!(require_can_act_on(role::ADMIN, role::ADMIN).is_err());
        assert!(require_can_act_on(role::OWNER, role::ADMIN).is_ok());
    }
}
