//! Logging push sink.
//!
//! Stands in for the real push pipeline (FCM, APNs, a queue worker). The
//! engine hands durable events over fire-and-forget; this sink just makes
//! them visible in the logs.

use huddle_core::{PushEvent, PushSink};

/// Push sink that logs every durable event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPushSink;

impl PushSink for LoggingPushSink {
    fn notify(&self, event: PushEvent) {
        match event {
            PushEvent::NewMessage { conversation_id, message_id, sender_id } => {
                tracing::debug!(
                    conversation_id,
                    message_id,
                    sender_id,
                    "push: new message persisted"
                );
            },
        }
    }
}
