//! Fan-out engine and session lifecycle.
//!
//! Ties together the three presence registries, the conversation store, and
//! the push sink. The engine is a pure dispatcher keyed on the inbound event
//! kind; all state lives in the registries, each behind its own mutex.
//!
//! Per-channel ordering comes from the caller: each session task feeds
//! events from its channel strictly in arrival order, so `typing(true)`
//! followed by `typing(false)` from one channel can never race itself.
//! Across channels no ordering is guaranteed or needed.
//!
//! # Locking
//!
//! Registry mutations are short synchronous critical sections; no registry
//! lock is ever held across an await. The read-modify-write that decides
//! "was this the last channel" happens entirely inside one lock acquisition,
//! so two racing disconnects of the same user cannot both observe "I was
//! last". Store calls and deliveries operate on snapshots taken under a
//! lock and released before awaiting.
//!
//! # Failure policy
//!
//! Unauthorized and malformed events are logged and dropped - the channel
//! stays open and the sender hears nothing, which avoids leaking
//! conversation membership to a probing client. Persistence failures on
//! `send_message`/`read_messages` abort that event's broadcast and surface
//! an error to the originating sender only. Delivery failures prune the
//! dead channel and never propagate.

use std::sync::Mutex;

use huddle_proto::{ClientEvent, DeliveryStatus, MessageBroadcast, ServerEvent};

use crate::{
    ChannelId, UserId,
    membership::MembershipTracker,
    push::{PushEvent, PushSink},
    registry::{ChannelSender, ConnectionRegistry},
    store::ConversationStore,
    typing::TypingTracker,
};

/// Presence fan-out engine.
///
/// Owns the registries; everything durable is delegated to the injected
/// collaborators.
pub struct FanoutEngine<S, P> {
    connections: Mutex<ConnectionRegistry>,
    membership: Mutex<MembershipTracker>,
    typing: Mutex<TypingTracker>,
    store: S,
    push: P,
}

impl<S, P> FanoutEngine<S, P>
where
    S: ConversationStore,
    P: PushSink,
{
    /// Create an engine with empty registries.
    pub fn new(store: S, push: P) -> Self {
        Self {
            connections: Mutex::new(ConnectionRegistry::new()),
            membership: Mutex::new(MembershipTracker::new()),
            typing: Mutex::new(TypingTracker::new()),
            store,
            push,
        }
    }

    /// Register an authenticated channel for a user.
    ///
    /// If this is the user's first channel, every other connected user is
    /// told the user came online.
    pub fn connect(&self, user_id: &str, channel_id: ChannelId, sender: ChannelSender) {
        let (newly_online, user_count) = {
            let mut connections = self.lock_connections();
            let newly_online = connections.register(user_id, channel_id, sender);
            if newly_online {
                let event = ServerEvent::UserStatus {
                    user_id: user_id.to_owned(),
                    is_online: true,
                };
                connections.broadcast_all(&event, Some(user_id));
            }
            (newly_online, connections.user_count())
        };

        tracing::info!(user_id, channel_id, newly_online, user_count, "channel connected");
    }

    /// Remove a channel for a user, cascading cleanup if it was the last.
    ///
    /// The offline cascade order is mandatory: unregister, purge
    /// membership, purge typing, then announce. Announcing earlier would let
    /// a racing event observe a phantom offline-but-still-typing user.
    /// `unregister` is idempotent, so converging clean and abrupt close
    /// paths here cannot double-run the cascade.
    pub fn disconnect(&self, user_id: &str, channel_id: ChannelId) {
        let went_offline = self.lock_connections().unregister(user_id, channel_id);
        if !went_offline {
            tracing::debug!(user_id, channel_id, "channel closed, user still online");
            return;
        }

        let left = self.lock_membership().purge_user(user_id);
        let cleared = self.lock_typing().purge_user(user_id);

        let user_count = {
            let mut connections = self.lock_connections();
            let event = ServerEvent::UserStatus {
                user_id: user_id.to_owned(),
                is_online: false,
            };
            connections.broadcast_all(&event, Some(user_id));
            connections.user_count()
        };

        tracing::info!(
            user_id,
            channel_id,
            conversations_left = left.len(),
            typing_cleared = cleared.len(),
            user_count,
            "user disconnected"
        );
    }

    /// Process one inbound event from a user's channel.
    ///
    /// Never fails: every failure mode resolves into a drop, a log line,
    /// or an error event to the sender, per the failure policy above.
    pub async fn handle_event(&self, user_id: &str, event: ClientEvent) {
        match event {
            ClientEvent::JoinConversation { conversation_id } => {
                self.handle_join(user_id, &conversation_id).await;
            },
            ClientEvent::LeaveConversation { conversation_id } => {
                self.handle_leave(user_id, &conversation_id);
            },
            ClientEvent::SendMessage { conversation_id, content, message_type } => {
                self.handle_send_message(user_id, &conversation_id, &content, &message_type).await;
            },
            ClientEvent::Typing { conversation_id, is_typing } => {
                self.handle_typing(user_id, &conversation_id, is_typing).await;
            },
            ClientEvent::ReadMessages { conversation_id } => {
                self.handle_read_messages(user_id, &conversation_id).await;
            },
        }
    }

    /// Authorize against the durable participant list, then track the join.
    /// No broadcast: watching a conversation is not announced.
    async fn handle_join(&self, user_id: &str, conversation_id: &str) {
        if !self.authorize(user_id, conversation_id, "join_conversation").await {
            return;
        }

        self.lock_membership().join(conversation_id, user_id);
        tracing::debug!(user_id, conversation_id, "joined conversation");
    }

    /// Leaving is unconditional: removing yourself from a liveness set you
    /// are not in is a harmless no-op, so there is nothing to authorize.
    fn handle_leave(&self, user_id: &str, conversation_id: &str) {
        self.lock_membership().leave(conversation_id, user_id);
        tracing::debug!(user_id, conversation_id, "left conversation");
    }

    /// Persist, then broadcast to the durable participant list.
    ///
    /// The broadcast targets the store's participant list, not the live
    /// member set: offline participants must still find the message in
    /// durable history, and the live push is purely the low-latency notify
    /// path. The persist strictly precedes any delivery - a message id that
    /// is not durably committed must never reach a recipient.
    async fn handle_send_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: &str,
        message_type: &str,
    ) {
        if !self.authorize(user_id, conversation_id, "send_message").await {
            return;
        }

        let stored = match self
            .store
            .create_message(conversation_id, user_id, content, message_type)
            .await
        {
            Ok(stored) => stored,
            Err(err) => {
                tracing::error!(user_id, conversation_id, %err, "message persist failed");
                self.send_error(user_id, "message could not be saved");
                return;
            },
        };

        self.push.notify(PushEvent::NewMessage {
            conversation_id: conversation_id.to_owned(),
            message_id: stored.message_id.clone(),
            sender_id: user_id.to_owned(),
        });

        let participants = match self.store.participants_of(conversation_id).await {
            Ok(participants) => participants,
            Err(err) => {
                tracing::error!(
                    user_id,
                    conversation_id,
                    %err,
                    "message persisted but participant lookup failed"
                );
                self.send_error(user_id, "message saved but not delivered");
                return;
            },
        };

        let event = ServerEvent::NewMessage {
            conversation_id: conversation_id.to_owned(),
            data: MessageBroadcast {
                message_id: stored.message_id,
                sender_id: user_id.to_owned(),
                content: content.to_owned(),
                message_type: message_type.to_owned(),
                created_at: stored.created_at,
                status: DeliveryStatus::stub(),
            },
        };

        self.deliver_to_users(
            participants.iter().filter(|p| p.as_str() != user_id),
            &event,
        );
    }

    /// Track the typing state, then notify the other live members.
    ///
    /// Typing is ephemeral: the broadcast goes to the current member set,
    /// not the durable participant list - undelivered-while-offline is
    /// acceptable for an indicator.
    async fn handle_typing(&self, user_id: &str, conversation_id: &str, is_typing: bool) {
        if !self.authorize(user_id, conversation_id, "typing").await {
            return;
        }

        self.lock_typing().set_typing(conversation_id, user_id, is_typing);

        let members = self.lock_membership().members_of(conversation_id);
        let event = ServerEvent::TypingStatus {
            conversation_id: conversation_id.to_owned(),
            user_id: user_id.to_owned(),
            is_typing,
        };

        self.deliver_to_users(members.iter().filter(|m| m.as_str() != user_id), &event);
    }

    /// Mark messages read in the store, then notify the live members -
    /// including the reader, whose other devices want the unread badge
    /// cleared too.
    async fn handle_read_messages(&self, user_id: &str, conversation_id: &str) {
        if !self.authorize(user_id, conversation_id, "read_messages").await {
            return;
        }

        if let Err(err) = self.store.mark_read(conversation_id, user_id).await {
            tracing::error!(user_id, conversation_id, %err, "read receipt persist failed");
            self.send_error(user_id, "read receipt could not be saved");
            return;
        }

        let members = self.lock_membership().members_of(conversation_id);
        let event = ServerEvent::MessagesRead {
            conversation_id: conversation_id.to_owned(),
            user_id: user_id.to_owned(),
        };

        self.deliver_to_users(members.iter(), &event);
    }

    /// Participant check shared by every conversation-scoped event.
    ///
    /// Returns `true` if the event may proceed. A "no" and a store failure
    /// both drop the event; only the store failure is logged loudly, since
    /// a "no" may simply be a probing client.
    async fn authorize(&self, user_id: &str, conversation_id: &str, kind: &str) -> bool {
        match self.store.is_participant(conversation_id, user_id).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(user_id, conversation_id, kind, "event from non-participant dropped");
                false
            },
            Err(err) => {
                tracing::error!(user_id, conversation_id, kind, %err, "authorization check failed");
                false
            },
        }
    }

    fn deliver_to_users<'a>(
        &self,
        users: impl Iterator<Item = &'a UserId>,
        event: &ServerEvent,
    ) {
        let mut connections = self.lock_connections();
        for user in users {
            let report = connections.deliver(user, event);
            if report.failed > 0 {
                tracing::debug!(
                    user_id = %user,
                    failed = report.failed,
                    "pruned dead channels during fan-out"
                );
            }
        }
    }

    fn send_error(&self, user_id: &str, message: &str) {
        let event = ServerEvent::Error { message: message.to_owned() };
        self.lock_connections().deliver(user_id, &event);
    }

    /// Whether the user currently holds at least one live channel.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.lock_connections().is_online(user_id)
    }

    /// Snapshot of every connected user.
    pub fn online_users(&self) -> Vec<UserId> {
        self.lock_connections().online_users()
    }

    /// Snapshot of a conversation's live member set.
    pub fn members_of(&self, conversation_id: &str) -> std::collections::HashSet<UserId> {
        self.lock_membership().members_of(conversation_id)
    }

    /// Snapshot of a conversation's current typers.
    pub fn typers_of(&self, conversation_id: &str) -> std::collections::HashSet<UserId> {
        self.lock_typing().typers_of(conversation_id)
    }

    /// Whether the user is currently watching a conversation.
    pub fn is_member(&self, conversation_id: &str, user_id: &str) -> bool {
        self.lock_membership().contains(conversation_id, user_id)
    }

    #[allow(clippy::expect_used)]
    fn lock_connections(&self) -> std::sync::MutexGuard<'_, ConnectionRegistry> {
        self.connections.lock().expect("connection registry mutex poisoned")
    }

    #[allow(clippy::expect_used)]
    fn lock_membership(&self) -> std::sync::MutexGuard<'_, MembershipTracker> {
        self.membership.lock().expect("membership tracker mutex poisoned")
    }

    #[allow(clippy::expect_used)]
    fn lock_typing(&self) -> std::sync::MutexGuard<'_, TypingTracker> {
        self.typing.lock().expect("typing tracker mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::sync::mpsc;

    use super::*;
    use crate::push::NoopPushSink;
    use crate::store::{StoreError, StoredMessage};

    #[derive(Clone)]
    struct StubStore {
        participants: Arc<HashMap<String, Vec<String>>>,
        fail_create: bool,
        fail_mark_read: bool,
    }

    impl StubStore {
        fn with_conversation(conversation_id: &str, users: &[&str]) -> Self {
            let mut participants = HashMap::new();
            participants.insert(
                conversation_id.to_string(),
                users.iter().map(ToString::to_string).collect(),
            );
            Self { participants: Arc::new(participants), fail_create: false, fail_mark_read: false }
        }
    }

    impl ConversationStore for StubStore {
        async fn is_participant(
            &self,
            conversation_id: &str,
            user_id: &str,
        ) -> Result<bool, StoreError> {
            Ok(self
                .participants
                .get(conversation_id)
                .is_some_and(|p| p.iter().any(|u| u == user_id)))
        }

        async fn participants_of(&self, conversation_id: &str) -> Result<Vec<UserId>, StoreError> {
            Ok(self.participants.get(conversation_id).cloned().unwrap_or_default())
        }

        async fn create_message(
            &self,
            _conversation_id: &str,
            _sender_id: &str,
            _content: &str,
            _message_type: &str,
        ) -> Result<StoredMessage, StoreError> {
            if self.fail_create {
                return Err(StoreError::Unavailable("write failed".to_string()));
            }
            Ok(StoredMessage { message_id: "msg-1".to_string(), created_at: Utc::now() })
        }

        async fn mark_read(&self, _conversation_id: &str, _user_id: &str) -> Result<(), StoreError> {
            if self.fail_mark_read {
                return Err(StoreError::Unavailable("write failed".to_string()));
            }
            Ok(())
        }
    }

    fn channel() -> (ChannelSender, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn typing_true_then_false_from_one_channel_leaves_no_typer() {
        let engine =
            FanoutEngine::new(StubStore::with_conversation("c1", &["u1", "u2"]), NoopPushSink);
        let (tx, _rx) = channel();
        engine.connect("u1", 1, tx);

        engine
            .handle_event("u1", ClientEvent::JoinConversation { conversation_id: "c1".to_string() })
            .await;
        engine
            .handle_event("u1", ClientEvent::Typing {
                conversation_id: "c1".to_string(),
                is_typing: true,
            })
            .await;
        engine
            .handle_event("u1", ClientEvent::Typing {
                conversation_id: "c1".to_string(),
                is_typing: false,
            })
            .await;

        assert!(engine.typers_of("c1").is_empty());
    }

    #[tokio::test]
    async fn typing_is_broadcast_to_other_members_only() {
        let engine =
            FanoutEngine::new(StubStore::with_conversation("c1", &["u1", "u2"]), NoopPushSink);
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        engine.connect("u1", 1, tx1);
        engine.connect("u2", 2, tx2);

        for user in ["u1", "u2"] {
            engine
                .handle_event(user, ClientEvent::JoinConversation {
                    conversation_id: "c1".to_string(),
                })
                .await;
        }

        // Connect-time status noise is not under test here.
        drain(&mut rx1);
        drain(&mut rx2);

        engine
            .handle_event("u1", ClientEvent::Typing {
                conversation_id: "c1".to_string(),
                is_typing: true,
            })
            .await;

        assert_eq!(drain(&mut rx2), vec![ServerEvent::TypingStatus {
            conversation_id: "c1".to_string(),
            user_id: "u1".to_string(),
            is_typing: true,
        }]);
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn non_participant_events_are_dropped_silently() {
        let engine = FanoutEngine::new(StubStore::with_conversation("c1", &["u2"]), NoopPushSink);
        let (tx1, mut rx1) = channel();
        engine.connect("u1", 1, tx1);

        engine
            .handle_event("u1", ClientEvent::JoinConversation { conversation_id: "c1".to_string() })
            .await;
        engine
            .handle_event("u1", ClientEvent::Typing {
                conversation_id: "c1".to_string(),
                is_typing: true,
            })
            .await;

        assert!(!engine.is_member("c1", "u1"));
        assert!(engine.typers_of("c1").is_empty());
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn leave_is_honored_without_authorization() {
        let engine = FanoutEngine::new(StubStore::with_conversation("c1", &["u1"]), NoopPushSink);
        let (tx, _rx) = channel();
        engine.connect("u1", 1, tx);

        engine
            .handle_event("u1", ClientEvent::JoinConversation { conversation_id: "c1".to_string() })
            .await;
        assert!(engine.is_member("c1", "u1"));

        engine
            .handle_event("u1", ClientEvent::LeaveConversation {
                conversation_id: "c1".to_string(),
            })
            .await;
        assert!(!engine.is_member("c1", "u1"));
    }

    #[tokio::test]
    async fn read_receipt_broadcast_includes_the_reader() {
        let engine =
            FanoutEngine::new(StubStore::with_conversation("c1", &["u1", "u2"]), NoopPushSink);
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        engine.connect("u1", 1, tx1);
        engine.connect("u2", 2, tx2);

        for user in ["u1", "u2"] {
            engine
                .handle_event(user, ClientEvent::JoinConversation {
                    conversation_id: "c1".to_string(),
                })
                .await;
        }
        drain(&mut rx1);
        drain(&mut rx2);

        engine
            .handle_event("u1", ClientEvent::ReadMessages { conversation_id: "c1".to_string() })
            .await;

        let expected = ServerEvent::MessagesRead {
            conversation_id: "c1".to_string(),
            user_id: "u1".to_string(),
        };
        assert_eq!(drain(&mut rx1), vec![expected.clone()]);
        assert_eq!(drain(&mut rx2), vec![expected]);
    }

    #[tokio::test]
    async fn persist_failure_reaches_the_sender_only() {
        let mut store = StubStore::with_conversation("c1", &["u1", "u2"]);
        store.fail_create = true;
        let engine = FanoutEngine::new(store, NoopPushSink);

        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        engine.connect("u1", 1, tx1);
        engine.connect("u2", 2, tx2);
        drain(&mut rx1);
        drain(&mut rx2);

        engine
            .handle_event("u1", ClientEvent::SendMessage {
                conversation_id: "c1".to_string(),
                content: "hi".to_string(),
                message_type: "text".to_string(),
            })
            .await;

        let events = drain(&mut rx1);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::Error { .. }));
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn first_connect_announces_online_to_others_only() {
        let engine = FanoutEngine::new(StubStore::with_conversation("c1", &["u1"]), NoopPushSink);
        let (tx1, mut rx1) = channel();
        engine.connect("u1", 1, tx1);

        let (tx2, mut rx2) = channel();
        engine.connect("u2", 2, tx2);

        assert_eq!(drain(&mut rx1), vec![ServerEvent::UserStatus {
            user_id: "u2".to_string(),
            is_online: true,
        }]);
        assert!(drain(&mut rx2).is_empty());

        // A second device for u2 is not a status change.
        let (tx3, _rx3) = channel();
        engine.connect("u2", 3, tx3);
        assert!(drain(&mut rx1).is_empty());
    }
}
