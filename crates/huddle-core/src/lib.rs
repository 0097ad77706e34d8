//! Presence core: connection registry, conversation membership, typing
//! state, and the fan-out engine that turns one inbound client event into a
//! correctly-scoped set of outbound broadcasts.
//!
//! # Architecture
//!
//! All mutable state lives in three owned registries:
//!
//! - [`ConnectionRegistry`]: user identity → live channels (multi-device)
//! - [`MembershipTracker`]: conversation → users actively watching it
//! - [`TypingTracker`]: conversation → users currently typing
//!
//! The [`FanoutEngine`] owns the registries behind per-registry mutexes and
//! dispatches on the closed event set from `huddle-proto`. It is otherwise
//! stateless: durable chat state (participant ACLs, message history, read
//! receipts) lives behind the [`ConversationStore`] collaborator, identity
//! behind [`Authenticator`], and mobile push behind [`PushSink`].
//!
//! All registry state is process-local and ephemeral by design: true
//! presence is recomputed from live channels after a restart, never from a
//! durable log.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod engine;
mod membership;
mod push;
mod registry;
mod store;
mod typing;

pub use auth::{AuthError, Authenticator};
pub use engine::FanoutEngine;
pub use membership::MembershipTracker;
pub use push::{NoopPushSink, PushEvent, PushSink};
pub use registry::{ChannelSender, ConnectionRegistry, DeliveryReport};
pub use store::{ConversationStore, StoreError, StoredMessage};
pub use typing::TypingTracker;

/// User identity, as issued by the authenticator.
pub type UserId = String;

/// Conversation identity, as issued by the conversation store.
pub type ConversationId = String;

/// Channel identity, assigned by the runtime per accepted connection.
pub type ChannelId = u64;
