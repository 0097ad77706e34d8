//! Inbound and outbound channel events.
//!
//! Both directions use internally-tagged JSON (`"type": "..."`). The tag set
//! is closed: every kind the server understands is a variant here, and
//! dispatch is an exhaustive `match`. Unknown tags fail deserialization and
//! are dropped by the session layer, not routed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events a client may send over its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Start watching a conversation (subscribes to its live activity).
    JoinConversation {
        /// Conversation being watched.
        conversation_id: String,
    },

    /// Stop watching a conversation.
    LeaveConversation {
        /// Conversation no longer watched.
        conversation_id: String,
    },

    /// Send a chat message. The message is durably persisted before any
    /// recipient sees it on the live channel.
    SendMessage {
        /// Target conversation.
        conversation_id: String,
        /// Message body.
        content: String,
        /// Message kind (e.g. `"text"`); opaque to the server.
        message_type: String,
    },

    /// Signal that the sender started or stopped typing.
    Typing {
        /// Conversation the indicator applies to.
        conversation_id: String,
        /// `true` while typing, `false` once stopped.
        is_typing: bool,
    },

    /// Mark all unread messages in a conversation as read.
    ReadMessages {
        /// Conversation whose messages were read.
        conversation_id: String,
    },
}

/// Events the server pushes to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A user came online or went fully offline.
    UserStatus {
        /// User whose status changed.
        user_id: String,
        /// `true` on first channel connect, `false` on last disconnect.
        is_online: bool,
    },

    /// A conversation member started or stopped typing.
    TypingStatus {
        /// Conversation the indicator applies to.
        conversation_id: String,
        /// The user typing (or no longer typing).
        user_id: String,
        /// Current typing state.
        is_typing: bool,
    },

    /// A new message was persisted to a conversation.
    NewMessage {
        /// Conversation the message belongs to.
        conversation_id: String,
        /// The persisted message.
        data: MessageBroadcast,
    },

    /// A user read the messages in a conversation.
    MessagesRead {
        /// Conversation that was read.
        conversation_id: String,
        /// The reader.
        user_id: String,
    },

    /// An event from this client failed server-side. Sent only to the
    /// originating channel, and only for persistence failures - dropped
    /// events (unauthorized, malformed) produce no reply at all.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

/// A persisted message as broadcast to conversation participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBroadcast {
    /// Identifier assigned by the conversation store.
    pub message_id: String,
    /// The message author.
    pub sender_id: String,
    /// Message body.
    pub content: String,
    /// Message kind (e.g. `"text"`).
    pub message_type: String,
    /// Persistence timestamp, RFC 3339 on the wire.
    pub created_at: DateTime<Utc>,
    /// Delivery-status stub attached to every broadcast.
    pub status: DeliveryStatus,
}

/// Delivery status attached to a broadcast message.
///
/// At broadcast time this is always the stub value: the message is sent but
/// not yet delivered or seen. Receipt tracking happens against durable
/// history, not on the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Message was accepted and persisted.
    pub sent: bool,
    /// Message was delivered to a recipient device.
    pub delivered: bool,
    /// Users who have seen the message.
    pub seen_by: Vec<String>,
}

impl DeliveryStatus {
    /// The status every message carries at broadcast time.
    #[must_use]
    pub fn stub() -> Self {
        Self { sent: true, delivered: false, seen_by: Vec::new() }
    }
}
