use thiserror::Error;

use crate::mute::MuteWindow;

/// Authorization/policy outcomes from the C8 gates.
/// `Muted` and `Blocked` are *policy* errors; `NotMember`/`Permission` are
/// *permission* errors — callers map these to distinct wire error codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("not a member of this room")]
    NotMember,

    #[error("blocked")]
    Blocked,

    #[error("muted")]
    Muted(MuteWindow),

    #[error("permission denied: {0}")]
    Permission(String),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
