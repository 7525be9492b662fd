//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding packets and events.
///
/// Decoding never panics on hostile input: every malformed packet maps to one
/// of these variants.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Packet text was empty.
    #[error("empty packet")]
    EmptyPacket,

    /// Leading type character is not a known packet type.
    #[error("unknown {layer} packet type {kind:?}")]
    UnknownPacketType {
        /// Protocol layer ("engine" or "socket").
        layer: &'static str,
        /// Offending type character.
        kind: char,
    },

    /// Binary event or ack packet. Chat traffic is text only.
    #[error("binary packets are not supported")]
    BinaryUnsupported,

    /// Packet structure is invalid (missing ack id, non-array event body...).
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Event name is not part of the chat protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Event payload does not match the shape expected for its name.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload {
        /// Event name.
        event: String,
        /// Deserializer message.
        reason: String,
    },

    /// JSON body could not be parsed or produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
