//! Wire protocol for the huddle presence server.
//!
//! The protocol is a stream of length-prefixed JSON frames over a single
//! long-lived bidirectional channel per client. Frame headers are a raw
//! 4-byte length for cheap framing; payloads are JSON tagged on a `type`
//! field so the channel stays debuggable with a packet capture and a pair
//! of eyes.
//!
//! Message flow:
//!
//! 1. The client opens the channel and sends [`ClientHello`] carrying its
//!    bearer credential.
//! 2. The server answers with [`ServerHello`] (or closes the channel if the
//!    credential is rejected).
//! 3. The client sends [`ClientEvent`] frames; the server pushes
//!    [`ServerEvent`] frames as presence and conversation activity happens.
//!
//! # Invariants
//!
//! - Event kinds form a closed set. An unknown `type` tag fails
//!   deserialization; it can never be silently mis-dispatched.
//! - Round-trip encoding must produce identical values (verified by
//!   property tests).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod events;
mod frame;
mod handshake;

pub use errors::ProtocolError;
pub use events::{ClientEvent, DeliveryStatus, MessageBroadcast, ServerEvent};
pub use frame::{FRAME_LEN_BYTES, MAX_FRAME_SIZE, decode_payload, encode_frame, frame_len};
pub use handshake::{ClientHello, ServerHello};

/// ALPN protocol identifier negotiated during the TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"huddle/1";
