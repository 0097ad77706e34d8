//! Connection registry for live channel tracking and delivery.
//!
//! Maps each connected user to the set of channels they hold open (one per
//! device). Delivery is best-effort: a send failure means that channel's
//! session task is already gone, so the dead handle is pruned on the spot
//! and the rest of the fan-out continues.
//!
//! # Invariants
//!
//! - A user present in the registry always maps to a non-empty channel set.
//!   The entry is removed together with its last channel, never left empty.
//! - Each channel is removed exactly once; `unregister` of an unknown or
//!   already-removed channel is a no-op returning `false`, so racing
//!   disconnect paths cannot double-run the offline cascade.

use std::collections::HashMap;

use huddle_proto::ServerEvent;
use tokio::sync::mpsc;

use crate::{ChannelId, UserId};

/// Handle for pushing outbound events to one channel.
///
/// The receiving half is owned by that channel's writer task; an unbounded
/// sender means a slow peer queues behind its own writer instead of stalling
/// the broadcast to everyone else.
pub type ChannelSender = mpsc::UnboundedSender<ServerEvent>;

/// Outcome of a best-effort delivery.
///
/// Callers generally ignore this except for logging; a failed channel has
/// already been pruned by the time the report is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Channels the event was queued to.
    pub delivered: usize,
    /// Dead channels pruned during the attempt.
    pub failed: usize,
}

impl DeliveryReport {
    fn absorb(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Registry of live channels per connected user.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// User ID → channel ID → sender. Inner maps are never empty.
    channels: HashMap<UserId, HashMap<ChannelId, ChannelSender>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for a user.
    ///
    /// Returns `true` iff this is the user's first channel, i.e. the user
    /// just came online and the caller should announce it. Each channel must
    /// be registered exactly once.
    pub fn register(&mut self, user_id: &str, channel_id: ChannelId, sender: ChannelSender) -> bool {
        let entry = self.channels.entry(user_id.to_owned()).or_default();
        let newly_online = entry.is_empty();
        entry.insert(channel_id, sender);
        newly_online
    }

    /// Remove a channel for a user.
    ///
    /// Returns `true` iff the user now has zero channels (went offline) and
    /// the caller should run the offline cascade. Removing a channel that
    /// was never registered, or is already removed, is a no-op returning
    /// `false`.
    pub fn unregister(&mut self, user_id: &str, channel_id: ChannelId) -> bool {
        let Some(entry) = self.channels.get_mut(user_id) else {
            return false;
        };

        if entry.remove(&channel_id).is_none() {
            return false;
        }

        if entry.is_empty() {
            self.channels.remove(user_id);
            return true;
        }

        false
    }

    /// Whether the user has at least one live channel.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.channels.contains_key(user_id)
    }

    /// Number of live channels for a user.
    #[must_use]
    pub fn channel_count(&self, user_id: &str) -> usize {
        self.channels.get(user_id).map_or(0, HashMap::len)
    }

    /// Number of connected users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.channels.len()
    }

    /// Snapshot of every connected user.
    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        self.channels.keys().cloned().collect()
    }

    /// Queue an event to every channel the user holds open.
    ///
    /// Each channel send is independent: a dead channel is pruned and does
    /// not prevent delivery to the user's other channels. Pruning the last
    /// channel removes the user's entry, but deliberately does NOT report
    /// the user as offline - the dead channel's own session teardown owns
    /// that announcement.
    pub fn deliver(&mut self, user_id: &str, event: &ServerEvent) -> DeliveryReport {
        let Some(entry) = self.channels.get_mut(user_id) else {
            return DeliveryReport::default();
        };

        let mut report = DeliveryReport::default();
        entry.retain(|channel_id, sender| {
            if sender.send(event.clone()).is_ok() {
                report.delivered += 1;
                true
            } else {
                tracing::debug!(user_id, channel_id, "pruning dead channel during delivery");
                report.failed += 1;
                false
            }
        });

        if entry.is_empty() {
            self.channels.remove(user_id);
        }

        report
    }

    /// Queue an event to every connected user except `exclude`.
    ///
    /// This is the global status fan-out used for online/offline
    /// announcements - O(connected users) by design.
    pub fn broadcast_all(&mut self, event: &ServerEvent, exclude: Option<&str>) -> DeliveryReport {
        let targets: Vec<UserId> = self
            .channels
            .keys()
            .filter(|user| exclude != Some(user.as_str()))
            .cloned()
            .collect();

        let mut report = DeliveryReport::default();
        for user in &targets {
            report.absorb(self.deliver(user, event));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (ChannelSender, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    fn status(user_id: &str, is_online: bool) -> ServerEvent {
        ServerEvent::UserStatus { user_id: user_id.to_string(), is_online }
    }

    #[test]
    fn first_channel_reports_newly_online() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        assert!(registry.register("u1", 1, tx1));
        assert!(!registry.register("u1", 2, tx2));

        assert!(registry.is_online("u1"));
        assert_eq!(registry.channel_count("u1"), 2);
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn last_unregister_reports_offline() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        registry.register("u1", 1, tx1);
        registry.register("u1", 2, tx2);

        assert!(!registry.unregister("u1", 1));
        assert!(registry.is_online("u1"));

        assert!(registry.unregister("u1", 2));
        assert!(!registry.is_online("u1"));
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();

        registry.register("u1", 1, tx);

        assert!(registry.unregister("u1", 1));
        // Second removal of the same channel mutates nothing.
        assert!(!registry.unregister("u1", 1));
        // Channels that were never registered are a no-op too.
        assert!(!registry.unregister("u1", 99));
        assert!(!registry.unregister("ghost", 1));
    }

    #[test]
    fn deliver_reaches_every_channel() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        registry.register("u1", 1, tx1);
        registry.register("u1", 2, tx2);

        let report = registry.deliver("u1", &status("u2", true));
        assert_eq!(report, DeliveryReport { delivered: 2, failed: 0 });

        assert_eq!(rx1.try_recv().ok(), Some(status("u2", true)));
        assert_eq!(rx2.try_recv().ok(), Some(status("u2", true)));
    }

    #[test]
    fn deliver_to_unknown_user_is_empty_report() {
        let mut registry = ConnectionRegistry::new();
        let report = registry.deliver("ghost", &status("u2", true));
        assert_eq!(report, DeliveryReport::default());
    }

    #[test]
    fn dead_channel_is_pruned_without_aborting_fanout() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, rx1) = channel();
        let (tx2, mut rx2) = channel();

        registry.register("u1", 1, tx1);
        registry.register("u1", 2, tx2);

        // Simulate a session task that died without unregistering.
        drop(rx1);

        let report = registry.deliver("u1", &status("u2", true));
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1 });
        assert_eq!(rx2.try_recv().ok(), Some(status("u2", true)));

        // The dead channel is gone; the live one remains.
        assert_eq!(registry.channel_count("u1"), 1);
        assert!(!registry.unregister("u1", 1));
    }

    #[test]
    fn pruning_last_channel_removes_entry() {
        let mut registry = ConnectionRegistry::new();
        let (tx, rx) = channel();

        registry.register("u1", 1, tx);
        drop(rx);

        registry.deliver("u1", &status("u2", true));
        assert!(!registry.is_online("u1"));
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn broadcast_all_excludes_the_subject() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let (tx3, mut rx3) = channel();

        registry.register("u1", 1, tx1);
        registry.register("u2", 2, tx2);
        registry.register("u3", 3, tx3);

        let report = registry.broadcast_all(&status("u1", true), Some("u1"));
        assert_eq!(report.delivered, 2);

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().ok(), Some(status("u1", true)));
        assert_eq!(rx3.try_recv().ok(), Some(status("u1", true)));
    }

    #[test]
    fn online_users_snapshot() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        registry.register("u1", 1, tx1);
        registry.register("u2", 2, tx2);

        let mut users = registry.online_users();
        users.sort();
        assert_eq!(users, vec!["u1".to_string(), "u2".to_string()]);
    }
}
