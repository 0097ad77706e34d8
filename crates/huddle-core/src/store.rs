//! Conversation store collaborator.
//!
//! Durable chat state - who may participate in a conversation, message
//! history, read receipts - lives behind this trait. The fan-out engine only
//! needs to know that a message was durably created before it broadcasts,
//! and which identities are entitled to receive it; what a message's
//! permanent representation looks like is entirely the store's business.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::UserId;

/// A durably persisted message, as the store reports it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Identifier assigned by the store.
    pub message_id: String,
    /// Persistence timestamp.
    pub created_at: DateTime<Utc>,
}

/// Errors from conversation store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The conversation does not exist.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// The backing store failed (I/O, connectivity, transaction).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable conversation state, implemented elsewhere.
///
/// Implementations share internal state via `Arc` so clones access the same
/// underlying store, mirroring how any connection-pooled backend behaves.
pub trait ConversationStore: Clone + Send + Sync + 'static {
    /// Whether a user is a durable participant of a conversation.
    ///
    /// This is the authorization check for every conversation-scoped event;
    /// an unknown conversation is simply "not a participant".
    fn is_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// The durable participant list of a conversation.
    fn participants_of(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    /// Durably create a message. Must complete before any broadcast of the
    /// returned message id.
    fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        message_type: &str,
    ) -> impl Future<Output = Result<StoredMessage, StoreError>> + Send;

    /// Mark the conversation's unread messages as read by a user.
    fn mark_read(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
