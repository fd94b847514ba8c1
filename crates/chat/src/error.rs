use relaychat_policy::{MuteWindow, PolicyError};
use relaychat_protocol::{error_codes, ErrorEnvelope};
use thiserror::Error;

/// The specific policy rejection a send/recall was refused for: muted (with
/// window), blocked, recall window expired, or wrong recall kind.
/// `relaychat_policy` only distinguishes these by variant or message text;
/// this type gives the chat boundary one stable shape to match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyReason {
    Muted(MuteWindow),
    Blocked,
    RecallWindowExpired,
    WrongRecallKind,
}

/// The seven error kinds, carried as a `thiserror` enum and mapped to a
/// stable wire code for the WS `error` envelope.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error("auth: {0}")]
    Auth(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("policy rejection: {0:?}")]
    Policy(PolicyReason),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(relaychat_store::Error),
}

impl From<relaychat_store::Error> for ChatError {
    /// `store::Error::Conflict`/`NotFound` carry their own taxonomy kind
    /// already (optimistic-CAS misses, missing rows); only genuine
    /// infrastructure failures (sqlx/json) fall through to `Internal`.
    fn from(err: relaychat_store::Error) -> Self {
        match err {
            relaychat_store::Error::Conflict(msg) => Self::Conflict(msg),
            relaychat_store::Error::NotFound(msg) => Self::NotFound(msg),
            other => Self::Internal(other),
        }
    }
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputInvalid(_) => error_codes::INPUT_INVALID,
            Self::Auth(_) => error_codes::AUTH,
            Self::Permission(_) => error_codes::PERMISSION,
            Self::Conflict(_) => error_codes::CONFLICT,
            Self::Policy(_) => error_codes::POLICY,
            Self::NotFound(_) => error_codes::NOT_FOUND,
            Self::Internal(_) => error_codes::INTERNAL,
        }
    }

    /// Wire-safe description. `Internal` never leaks its source.
    pub fn user_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".into(),
            other => other.to_string(),
        }
    }

    pub fn into_envelope(self, packet_id: Option<String>) -> ErrorEnvelope {
        ErrorEnvelope::new(self.user_message()).with_packet_id(packet_id)
    }
}

impl From<PolicyError> for ChatError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::NotMember => Self::Permission("not a member of this room".into()),
            PolicyError::Blocked => Self::Policy(PolicyReason::Blocked),
            PolicyError::Muted(window) => Self::Policy(PolicyReason::Muted(window)),
            PolicyError::Permission(reason) if reason == "window expired" => {
                Self::Policy(PolicyReason::RecallWindowExpired)
            },
            PolicyError::Permission(reason) => Self::Permission(reason),
        }
    }
}

impl From<relaychat_notify::Error> for ChatError {
    fn from(err: relaychat_notify::Error) -> Self {
        match err {
            relaychat_notify::Error::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
