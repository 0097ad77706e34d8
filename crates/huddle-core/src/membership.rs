//! Conversation membership tracking.
//!
//! "Membership" here is a liveness signal: which users currently have a
//! conversation open over a live channel. It is distinct from the durable
//! participant list in the conversation store, which authorizes a user to be
//! in the conversation at all. A user can hold durable participation while
//! watching nothing, and the other way around never happens because joins
//! are authorized against the store before they are honored.
//!
//! # Invariants
//!
//! - A tracked conversation always maps to a non-empty member set; entries
//!   are deleted when their last member leaves.
//! - Nothing here outlives the user's last channel: the session lifecycle
//!   sweeps the user out of every conversation on full disconnect via
//!   [`MembershipTracker::purge_user`].

use std::collections::{HashMap, HashSet};

use crate::{ConversationId, UserId};

/// Tracks which users are actively watching which conversations.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    /// Conversation ID → watching users. Inner sets are never empty.
    members: HashMap<ConversationId, HashSet<UserId>>,
}

impl MembershipTracker {
    /// Create a new empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a conversation's member set. Idempotent.
    pub fn join(&mut self, conversation_id: &str, user_id: &str) {
        self.members
            .entry(conversation_id.to_owned())
            .or_default()
            .insert(user_id.to_owned());
    }

    /// Remove a user from a conversation's member set. Idempotent; removing
    /// the last member deletes the conversation entry.
    pub fn leave(&mut self, conversation_id: &str, user_id: &str) {
        if let Some(set) = self.members.get_mut(conversation_id) {
            set.remove(user_id);
            if set.is_empty() {
                self.members.remove(conversation_id);
            }
        }
    }

    /// Current members of a conversation.
    ///
    /// Returns an empty set (never an error) for an unknown conversation.
    #[must_use]
    pub fn members_of(&self, conversation_id: &str) -> HashSet<UserId> {
        self.members.get(conversation_id).cloned().unwrap_or_default()
    }

    /// Whether a user is currently watching a conversation.
    #[must_use]
    pub fn contains(&self, conversation_id: &str, user_id: &str) -> bool {
        self.members.get(conversation_id).is_some_and(|set| set.contains(user_id))
    }

    /// Whether any entry exists for a conversation.
    #[must_use]
    pub fn is_tracked(&self, conversation_id: &str) -> bool {
        self.members.contains_key(conversation_id)
    }

    /// Remove a user from every conversation they are watching.
    ///
    /// Returns the conversations the user was removed from so the caller can
    /// decide whether to announce the departure. Used exclusively by the
    /// full-disconnect cleanup.
    pub fn purge_user(&mut self, user_id: &str) -> Vec<ConversationId> {
        let mut removed = Vec::new();
        self.members.retain(|conversation_id, set| {
            if set.remove(user_id) {
                removed.push(conversation_id.clone());
            }
            !set.is_empty()
        });
        removed
    }
}
