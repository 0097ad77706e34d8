//! Ephemeral typing-state tracking.
//!
//! Derived purely from transient `typing` events and never persisted.
//! "Set typing = false" and "never typed" collapse into the same observable
//! state: no entry. There is no TTL on typing entries - a client that
//! vanishes mid-keystroke is cleaned up by its own disconnect cascade, which
//! is the only other path that clears this tracker.
//!
//! # Invariants
//!
//! - A tracked conversation always maps to a non-empty typer set; entries
//!   are deleted when the last typer stops.

use std::collections::{HashMap, HashSet};

use crate::{ConversationId, UserId};

/// Tracks which users are currently signaling "typing" per conversation.
#[derive(Debug, Default)]
pub struct TypingTracker {
    /// Conversation ID → typing users. Inner sets are never empty.
    typers: HashMap<ConversationId, HashSet<UserId>>,
}

impl TypingTracker {
    /// Create a new empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a typing-state change. Both directions are idempotent.
    pub fn set_typing(&mut self, conversation_id: &str, user_id: &str, is_typing: bool) {
        if is_typing {
            self.typers
                .entry(conversation_id.to_owned())
                .or_default()
                .insert(user_id.to_owned());
        } else if let Some(set) = self.typers.get_mut(conversation_id) {
            set.remove(user_id);
            if set.is_empty() {
                self.typers.remove(conversation_id);
            }
        }
    }

    /// Users currently typing in a conversation.
    ///
    /// Returns an empty set (never an error) for an unknown conversation.
    #[must_use]
    pub fn typers_of(&self, conversation_id: &str) -> HashSet<UserId> {
        self.typers.get(conversation_id).cloned().unwrap_or_default()
    }

    /// Whether any entry exists for a conversation.
    #[must_use]
    pub fn is_tracked(&self, conversation_id: &str) -> bool {
        self.typers.contains_key(conversation_id)
    }

    /// Clear a user's typing state in every conversation.
    ///
    /// Returns the conversations that were cleared. Used exclusively by the
    /// full-disconnect cleanup.
    pub fn purge_user(&mut self, user_id: &str) -> Vec<ConversationId> {
        let mut removed = Vec::new();
        self.typers.retain(|conversation_id, set| {
            if set.remove(user_id) {
                removed.push(conversation_id.clone());
            }
            !set.is_empty()
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_true_then_false_leaves_no_entry() {
        let mut tracker = TypingTracker::new();

        tracker.set_typing("c1", "u1", true);
        assert!(tracker.typers_of("c1").contains("u1"));

        tracker.set_typing("c1", "u1", false);
        assert!(tracker.typers_of("c1").is_empty());
        assert!(!tracker.is_tracked("c1"));
    }

    #[test]
    fn stopping_without_starting_is_a_no_op() {
        let mut tracker = TypingTracker::new();

        tracker.set_typing("c1", "u1", false);
        assert!(!tracker.is_tracked("c1"));
    }

    #[test]
    fn unknown_conversation_is_empty_set_without_entry() {
        let tracker = TypingTracker::new();

        assert!(tracker.typers_of("ghost").is_empty());
        assert!(!tracker.is_tracked("ghost"));
    }

    #[test]
    fn multiple_typers_tracked_independently() {
        let mut tracker = TypingTracker::new();

        tracker.set_typing("c1", "u1", true);
        tracker.set_typing("c1", "u2", true);
        assert_eq!(tracker.typers_of("c1").len(), 2);

        tracker.set_typing("c1", "u1", false);
        let typers = tracker.typers_of("c1");
        assert!(!typers.contains("u1"));
        assert!(typers.contains("u2"));
    }

    #[test]
    fn purge_user_clears_every_conversation() {
        let mut tracker = TypingTracker::new();

        tracker.set_typing("c1", "u1", true);
        tracker.set_typing("c2", "u1", true);
        tracker.set_typing("c2", "u2", true);

        let mut removed = tracker.purge_user("u1");
        removed.sort();
        assert_eq!(removed, vec!["c1".to_string(), "c2".to_string()]);

        assert!(!tracker.is_tracked("c1"));
        assert!(tracker.typers_of("c2").contains("u2"));
    }
}
