//! Channel handshake messages.
//!
//! The first frame on a new channel must be [`ClientHello`]. The server
//! verifies the credential through its authenticator and either answers with
//! [`ServerHello`] or closes the channel. Nothing is registered for a channel
//! that never completes the handshake.

use serde::{Deserialize, Serialize};

/// First frame a client sends on a new channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "hello")]
pub struct ClientHello {
    /// Bearer credential proving the client's identity.
    pub token: String,
}

/// Server acknowledgement of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "welcome")]
pub struct ServerHello {
    /// Identity the credential resolved to.
    pub user_id: String,
}
