//! Authentication collaborator.
//!
//! Credential verification happens once per channel, before anything is
//! registered. A rejected credential is fatal to that channel and touches no
//! registry state.

use std::future::Future;

use crate::UserId;

/// Errors from credential verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The credential is unknown, expired, or malformed.
    #[error("invalid credential")]
    InvalidCredential,

    /// The verifier itself failed (e.g. a key service was unreachable).
    #[error("authenticator unavailable: {0}")]
    Unavailable(String),
}

/// Verifies the bearer credential presented when a channel opens.
pub trait Authenticator: Send + Sync + 'static {
    /// Resolve a credential to the user identity it was issued for.
    fn verify(&self, credential: &str) -> impl Future<Output = Result<UserId, AuthError>> + Send;
}
