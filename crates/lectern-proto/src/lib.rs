//! Lectern wire protocol
//!
//! The chat backend speaks Socket.IO over a WebSocket. This crate owns both
//! layers of that wire format and the typed events carried on top of it:
//!
//! - [`EnginePacket`]: Engine.IO v4 transport packets (open, ping, message...)
//! - [`SocketPacket`]: Socket.IO v5 packets carried inside Engine.IO messages
//! - [`ClientEvent`] / [`ServerEvent`]: the chat events, one variant per
//!   protocol event, so handlers match on types instead of inspecting JSON
//!
//! Everything here is pure encoding and decoding. Connection lifecycle lives
//! in `lectern-core`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod event;
pub mod packet;

pub use errors::{ProtocolError, Result};
pub use event::{
    ChatId, ClientEvent, EventKind, JoinChat, MessageId, MessagePayload, ParticipantId,
    SendMessage, ServerEvent,
};
pub use packet::{DEFAULT_NAMESPACE, ENGINE_PROTOCOL, EnginePacket, Handshake, SocketPacket};
