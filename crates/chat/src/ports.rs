use async_trait::async_trait;
use thiserror::Error;

/// Error surfaced by [`AuthPort`]/[`VerifyCodePort`] ("Optional
/// Redis-backed subsystems. Keep them behind interfaces... Absent
/// implementations must cause related endpoints to report 'service not
/// configured', never to silently succeed.").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("service not configured")]
    NotConfigured,
    #[error("{0}")]
    Rejected(String),
}

/// Resolves a bearer token to an authenticated user id. No default
/// implementation talks to a network — embedders wire their own token
/// store (Redis or otherwise) behind this trait.
#[async_trait]
pub trait AuthPort: Send + Sync {
    async fn resolve_token(&self, token: &str) -> Result<u64, PortError>;
}

/// SMS/email verification-code issuance and check. Dispatch mechanics are
/// explicitly out of scope; only this contract is.
#[async_trait]
pub trait VerifyCodePort: Send + Sync {
    async fn issue(&self, target: &str) -> Result<(), PortError>;
    async fn verify(&self, target: &str, code: &str) -> Result<bool, PortError>;
}

/// Default `AuthPort` that fails loudly instead of silently succeeding.
pub struct NullAuthPort;

#[async_trait]
impl AuthPort for NullAuthPort {
    async fn resolve_token(&self, _token: &str) -> Result<u64, PortError> {
        Err(PortError::NotConfigured)
    }
}

/// Default `VerifyCodePort`, same fail-loud contract as [`NullAuthPort`].
pub struct NullVerifyCodePort;

#[async_trait]
impl VerifyCodePort for NullVerifyCodePort {
    async fn issue(&self, _target: &str) -> Result<(), PortError> {
        Err(PortError::NotConfigured)
    }

    async fn verify(&self, _target: &str, _code: &str) -> Result<bool, PortError> {
        Err(PortError::NotConfigured)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_auth_port_reports_not_configured() {
        let port = NullAuthPort;
        assert_eq!(port.resolve_token("x").await, Err(PortError::NotConfigured));
    }

    #[tokio::test]
    async fn null_verify_code_port_reports_not_configured() {
        let port = NullVerifyCodePort;
        assert_eq!(port.issue("x").await, Err(PortError::NotConfigured));
        assert_eq!(
            port.verify("x", "000000").await,
            Err(PortError::NotConfigured)
        );
    }
}
