//! Per-connection session lifecycle.
//!
//! Each accepted connection runs one session task: handshake, then a writer
//! task that drains the channel's outbound queue, and a reader loop that
//! feeds inbound events to the engine strictly in arrival order. Sequential
//! handling is what guarantees per-channel event ordering - `typing(true)`
//! then `typing(false)` from one channel can never interleave.
//!
//! All exit paths - clean close, read error, framing violation - converge on
//! exactly one `engine.disconnect` for the channel. The engine's idempotent
//! unregister makes a second call harmless, but this module never produces
//! one.

use std::sync::Arc;
use std::time::Duration;

use huddle_core::{Authenticator, ChannelId, ConversationStore, FanoutEngine, PushSink};
use huddle_proto::{
    ClientEvent, ClientHello, FRAME_LEN_BYTES, ServerHello, decode_payload, encode_frame,
    frame_len,
};
use quinn::RecvStream;

use crate::{error::ServerError, transport::QuicConnection};

/// Application close code: credential rejected or handshake violated.
pub const CLOSE_AUTH_FAILED: u32 = 0x01;
/// Application close code: unrecoverable framing violation.
pub const CLOSE_PROTOCOL: u32 = 0x02;
/// Application close code: connection limit reached.
pub const CLOSE_SERVER_FULL: u32 = 0x03;

/// Drive one client connection from handshake to teardown.
pub(crate) async fn run_session<S, A, P>(
    conn: QuicConnection,
    engine: Arc<FanoutEngine<S, P>>,
    auth: Arc<A>,
    handshake_timeout: Duration,
) -> Result<(), ServerError>
where
    S: ConversationStore,
    A: Authenticator,
    P: PushSink,
{
    let remote = conn.remote_addr();
    let (mut send, mut recv) = conn.accept_bi().await?;

    // Authentication is fatal-on-failure and happens before any registry
    // mutation: a channel that never completes the handshake was never here.
    let hello_bytes = match tokio::time::timeout(handshake_timeout, read_frame(&mut recv)).await {
        Ok(Ok(Some(bytes))) => bytes,
        Ok(Ok(None)) => {
            tracing::debug!(%remote, "channel closed before handshake");
            return Ok(());
        },
        Ok(Err(err)) => {
            conn.close(CLOSE_PROTOCOL, b"malformed handshake");
            return Err(err);
        },
        Err(_) => {
            tracing::debug!(%remote, "handshake timed out");
            conn.close(CLOSE_AUTH_FAILED, b"handshake timeout");
            return Ok(());
        },
    };

    let Ok(hello) = decode_payload::<ClientHello>(&hello_bytes) else {
        tracing::warn!(%remote, "first frame was not a hello");
        conn.close(CLOSE_AUTH_FAILED, b"expected hello");
        return Ok(());
    };

    let user_id = match auth.verify(&hello.token).await {
        Ok(user_id) => user_id,
        Err(err) => {
            tracing::warn!(%remote, %err, "authentication failed");
            conn.close(CLOSE_AUTH_FAILED, b"authentication failed");
            return Ok(());
        },
    };

    let mut buf = Vec::new();
    encode_frame(&ServerHello { user_id: user_id.clone() }, &mut buf)?;
    send.write_all(&buf)
        .await
        .map_err(|e| ServerError::Transport(format!("handshake ack failed: {e}")))?;

    let channel_id = new_channel_id();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    engine.connect(&user_id, channel_id, tx);

    tracing::debug!(user_id = %user_id, channel_id, %remote, "session established");

    // Writer task: sole owner of the send half. Outbound events queue here,
    // so a slow peer backs up its own queue instead of the broadcasters.
    let writer_user = user_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let mut frame = Vec::new();
            if let Err(err) = encode_frame(&event, &mut frame) {
                tracing::error!(user_id = %writer_user, %err, "dropping unencodable outbound event");
                continue;
            }
            if send.write_all(&frame).await.is_err() {
                // Peer is gone; the reader loop is about to find out too.
                break;
            }
        }
    });

    // Reader loop: one event fully handled before the next is read.
    loop {
        match read_frame(&mut recv).await {
            Ok(Some(bytes)) => match decode_payload::<ClientEvent>(&bytes) {
                Ok(event) => engine.handle_event(&user_id, event).await,
                Err(err) => {
                    // Malformed events are dropped; the channel stays open.
                    tracing::debug!(user_id = %user_id, %err, "dropping malformed event");
                },
            },
            Ok(None) => break,
            Err(err) => {
                // A framing violation desynchronizes the stream; the channel
                // cannot continue.
                tracing::debug!(user_id = %user_id, %err, "closing channel");
                conn.close(CLOSE_PROTOCOL, b"framing violation");
                break;
            },
        }
    }

    // Clean and abrupt closes converge here, once per channel.
    engine.disconnect(&user_id, channel_id);

    // Disconnect dropped the registry's sender, so the writer drains its
    // queue and exits on its own.
    let _ = writer.await;

    Ok(())
}

/// Read one length-prefixed frame.
///
/// `Ok(None)` means the peer ended the stream (cleanly or not) - either way
/// the session is over. `Err` means the peer violated framing and the stream
/// cannot be resynchronized.
async fn read_frame(recv: &mut RecvStream) -> Result<Option<Vec<u8>>, ServerError> {
    let mut prefix = [0u8; FRAME_LEN_BYTES];
    if recv.read_exact(&mut prefix).await.is_err() {
        return Ok(None);
    }

    let len = frame_len(prefix)?;

    let mut body = vec![0u8; len];
    recv.read_exact(&mut body)
        .await
        .map_err(|e| ServerError::Transport(format!("truncated frame: {e}")))?;

    Ok(Some(body))
}

/// Assign a fresh channel id from OS randomness.
///
/// # Panics
///
/// Panics if the OS RNG fails - a server that cannot draw randomness for
/// channel identities cannot operate, and the failure is unrecoverable.
#[allow(clippy::expect_used)]
fn new_channel_id() -> ChannelId {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).expect("invariant: OS RNG failure is unrecoverable");
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_distinct() {
        let a = new_channel_id();
        let b = new_channel_id();
        assert_ne!(a, b, "consecutive channel ids should differ");
    }
}
