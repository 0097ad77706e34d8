//! Static bearer-token authenticator.
//!
//! Maps opaque tokens to user identities. This is the development and test
//! stand-in for a real credential verifier (JWT validation, a session
//! service) behind the same `Authenticator` trait - token issuance is not
//! this server's business.

use std::collections::HashMap;

use huddle_core::{AuthError, Authenticator, UserId};

/// Authenticator backed by a fixed token → user map.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuthenticator {
    /// Create an authenticator with no valid tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as a credential for `user_id`.
    pub fn insert(&mut self, token: impl Into<String>, user_id: impl Into<UserId>) {
        self.tokens.insert(token.into(), user_id.into());
    }
}

impl Authenticator for StaticTokenAuthenticator {
    async fn verify(&self, credential: &str) -> Result<UserId, AuthError> {
        self.tokens.get(credential).cloned().ok_or(AuthError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_to_user() {
        let mut auth = StaticTokenAuthenticator::new();
        auth.insert("secret-1", "u1");

        assert_eq!(auth.verify("secret-1").await.unwrap(), "u1");
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let auth = StaticTokenAuthenticator::new();
        assert!(matches!(auth.verify("nope").await, Err(AuthError::InvalidCredential)));
    }
}
