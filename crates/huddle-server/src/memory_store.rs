//! In-memory conversation store.
//!
//! Backs the binary and the test suite. Real deployments put their database
//! behind the same `ConversationStore` trait; this implementation exists so
//! the presence core can run without one. State is shared via `Arc`, so
//! clones see the same conversations.

#![allow(clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use huddle_core::{ConversationStore, StoreError, StoredMessage, UserId};

/// In-memory store implementation.
///
/// Thread-safe through a Mutex, using `lock().expect()` which will panic if
/// the mutex is poisoned - acceptable for a dev/test collaborator.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

struct MemoryStoreInner {
    /// Conversation ID → durable participant list
    conversations: HashMap<String, Vec<UserId>>,

    /// Conversation ID → messages in creation order
    messages: HashMap<String, Vec<MessageRecord>>,

    /// Monotonic source for message ids
    next_message_id: u64,
}

#[derive(Debug, Clone)]
struct MessageRecord {
    message_id: String,
    sender_id: UserId,
    content: String,
    message_type: String,
    created_at: DateTime<Utc>,
    read_by: HashSet<UserId>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                conversations: HashMap::new(),
                messages: HashMap::new(),
                next_message_id: 0,
            })),
        }
    }

    /// Seed a conversation with its durable participant list.
    ///
    /// Replaces the participant list if the conversation already exists.
    pub fn create_conversation<I, T>(&self, conversation_id: &str, participants: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<UserId>,
    {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.conversations.insert(
            conversation_id.to_owned(),
            participants.into_iter().map(Into::into).collect(),
        );
    }

    /// Number of messages stored for a conversation.
    #[must_use]
    pub fn message_count(&self, conversation_id: &str) -> usize {
        let inner = self.inner.lock().expect("mutex poisoned");
        inner.messages.get(conversation_id).map_or(0, Vec::len)
    }

    /// The most recent message in a conversation, as
    /// `(message_id, content, message_type, created_at)`.
    #[must_use]
    pub fn latest_message(
        &self,
        conversation_id: &str,
    ) -> Option<(String, String, String, DateTime<Utc>)> {
        let inner = self.inner.lock().expect("mutex poisoned");
        inner.messages.get(conversation_id).and_then(|messages| {
            messages.last().map(|m| {
                (m.message_id.clone(), m.content.clone(), m.message_type.clone(), m.created_at)
            })
        })
    }

    /// Messages in a conversation not yet read by `user_id`, excluding the
    /// user's own.
    #[must_use]
    pub fn unread_count(&self, conversation_id: &str, user_id: &str) -> usize {
        let inner = self.inner.lock().expect("mutex poisoned");
        inner.messages.get(conversation_id).map_or(0, |messages| {
            messages
                .iter()
                .filter(|m| m.sender_id != user_id && !m.read_by.contains(user_id))
                .count()
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore for MemoryStore {
    async fn is_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        Ok(inner
            .conversations
            .get(conversation_id)
            .is_some_and(|participants| participants.iter().any(|u| u == user_id)))
    }

    async fn participants_of(&self, conversation_id: &str) -> Result<Vec<UserId>, StoreError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        inner
            .conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_owned()))
    }

    async fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        message_type: &str,
    ) -> Result<StoredMessage, StoreError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        if !inner.conversations.contains_key(conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id.to_owned()));
        }

        inner.next_message_id += 1;
        let message_id = format!("msg-{}", inner.next_message_id);
        let created_at = Utc::now();

        inner.messages.entry(conversation_id.to_owned()).or_default().push(MessageRecord {
            message_id: message_id.clone(),
            sender_id: sender_id.to_owned(),
            content: content.to_owned(),
            message_type: message_type.to_owned(),
            created_at,
            read_by: HashSet::new(),
        });

        Ok(StoredMessage { message_id, created_at })
    }

    async fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        // Only messages from other senders become "read"; marking an unknown
        // conversation is a no-op, matching a mark-all-unread-rows update
        // that touches zero rows.
        if let Some(messages) = inner.messages.get_mut(conversation_id) {
            for message in messages.iter_mut().filter(|m| m.sender_id != user_id) {
                message.read_by.insert(user_id.to_owned());
            }
        }

        Ok(())
    }
}
