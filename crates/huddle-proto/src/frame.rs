//! Length-prefixed frame codec.
//!
//! Wire layout per frame: `[length: u32 BE] + [payload: length bytes of
//! JSON]`. The length prefix lets the session layer read a frame with two
//! exact reads and reject oversized frames before allocating for them.
//!
//! # Invariants
//!
//! - Size Limit: the payload MUST NOT exceed [`MAX_FRAME_SIZE`]. Enforced at
//!   encode time and again when a received length prefix is validated, so a
//!   malicious peer cannot make the server allocate an arbitrary buffer.
//! - A zero-length frame is invalid. Every protocol message has a body.

use bytes::BufMut;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::ProtocolError;

/// Maximum payload size for a single frame (64 KiB).
///
/// Chat events are small; anything larger is a protocol violation, not a big
/// message.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Size of the length prefix preceding every payload.
pub const FRAME_LEN_BYTES: usize = 4;

/// Encode a value as a length-prefixed JSON frame into `dst`.
///
/// # Errors
///
/// - [`ProtocolError::Encode`] if JSON serialization fails
/// - [`ProtocolError::FrameTooLarge`] if the encoded payload exceeds
///   [`MAX_FRAME_SIZE`]
pub fn encode_frame<T: Serialize>(value: &T, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
    let body = serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: body.len(), max: MAX_FRAME_SIZE });
    }

    // INVARIANT: body.len() <= MAX_FRAME_SIZE (64 KiB) < u32::MAX, checked above.
    dst.put_u32(body.len() as u32);
    dst.put_slice(&body);

    Ok(())
}

/// Validate a received length prefix and return the payload size to read.
///
/// # Errors
///
/// - [`ProtocolError::EmptyFrame`] if the prefix declares a zero-length
///   payload
/// - [`ProtocolError::FrameTooLarge`] if the prefix declares a payload above
///   [`MAX_FRAME_SIZE`]
pub fn frame_len(prefix: [u8; FRAME_LEN_BYTES]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(prefix) as usize;

    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }

    Ok(len)
}

/// Decode a frame payload into a protocol type.
///
/// Decoding failures cover malformed JSON, unknown `type` tags, and missing
/// fields - the caller decides whether that drops the frame or the channel.
///
/// # Errors
///
/// - [`ProtocolError::FrameTooLarge`] if `bytes` exceeds [`MAX_FRAME_SIZE`]
/// - [`ProtocolError::Decode`] if deserialization fails
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_SIZE });
    }

    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ClientEvent;

    fn split_frame(wire: &[u8]) -> (usize, &[u8]) {
        let mut prefix = [0u8; FRAME_LEN_BYTES];
        prefix.copy_from_slice(&wire[..FRAME_LEN_BYTES]);
        (frame_len(prefix).unwrap(), &wire[FRAME_LEN_BYTES..])
    }

    #[test]
    fn encode_then_decode_event() {
        let event = ClientEvent::JoinConversation { conversation_id: "c1".to_string() };

        let mut wire = Vec::new();
        encode_frame(&event, &mut wire).unwrap();

        let (len, body) = split_frame(&wire);
        assert_eq!(len, body.len());

        let parsed: ClientEvent = decode_payload(body).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn oversized_payload_rejected_at_encode() {
        let event = ClientEvent::SendMessage {
            conversation_id: "c1".to_string(),
            content: "x".repeat(MAX_FRAME_SIZE + 1),
            message_type: "text".to_string(),
        };

        let mut wire = Vec::new();
        let result = encode_frame(&event, &mut wire);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_length_prefix_rejected() {
        let prefix = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        assert!(matches!(frame_len(prefix), Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn zero_length_prefix_rejected() {
        assert!(matches!(frame_len([0; FRAME_LEN_BYTES]), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        let result = decode_payload::<ClientEvent>(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
