//! Protocol error types.

/// Errors from frame encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload failed to serialize to JSON.
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// Payload bytes were not valid JSON for the expected type. This covers
    /// unknown `type` tags as well as missing or mistyped fields.
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// Frame exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Actual frame size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// Frame header declared a zero-length payload.
    #[error("empty frame")]
    EmptyFrame,
}
