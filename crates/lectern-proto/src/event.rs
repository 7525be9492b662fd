//! Typed chat protocol events.
//!
//! The chat protocol has three client-to-server events and three
//! server-to-client events. Each direction is a tagged union so that
//! handlers are checked for exhaustiveness by the compiler.
//!
//! | Direction | Event                     | Payload                    |
//! |-----------|---------------------------|----------------------------|
//! | out       | `join_chat`               | [`JoinChat`]               |
//! | out       | `leave_chat`              | `{}`                       |
//! | out       | `send_message`            | [`SendMessage`]            |
//! | in        | `chat_participant_joined` | ignored                    |
//! | in        | `new_message`             | [`MessagePayload`]         |
//! | in        | `update_chat`             | [`MessagePayload`]         |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    errors::{ProtocolError, Result},
    packet::SocketPacket,
};

/// Server-assigned conversation identifier.
pub type ChatId = u64;

/// Identifier of a participant within a conversation roster.
pub type ParticipantId = u64;

/// Server-assigned message identifier.
pub type MessageId = u64;

const JOIN_CHAT: &str = "join_chat";
const LEAVE_CHAT: &str = "leave_chat";
const SEND_MESSAGE: &str = "send_message";
const CHAT_PARTICIPANT_JOINED: &str = "chat_participant_joined";
const NEW_MESSAGE: &str = "new_message";
const UPDATE_CHAT: &str = "update_chat";

/// Payload of `join_chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChat {
    /// Conversation to enter.
    pub chat_id: ChatId,
    /// Our participant id in that conversation.
    pub chat_participant_id: ParticipantId,
}

/// Payload of `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Target conversation.
    pub chat_id: ChatId,
    /// Our participant id in that conversation.
    pub chat_participant_id: ParticipantId,
    /// Message text.
    pub content: String,
}

/// Message broadcast carried by `new_message` and `update_chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Conversation the message belongs to.
    pub chat_id: ChatId,
    /// Server-assigned message id.
    pub message_id: MessageId,
    /// Participant id of the author.
    pub sender_id: ParticipantId,
    /// Message text.
    pub content: String,
    /// Server timestamp (RFC 3339).
    pub timestamp: DateTime<Utc>,
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Enter a conversation room.
    JoinChat(JoinChat),
    /// Exit the current room.
    LeaveChat,
    /// Post a message.
    SendMessage(SendMessage),
}

impl ClientEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat(_) => JOIN_CHAT,
            Self::LeaveChat => LEAVE_CHAT,
            Self::SendMessage(_) => SEND_MESSAGE,
        }
    }

    /// Build the Socket.IO event packet.
    pub fn to_packet(&self) -> Result<SocketPacket> {
        let payload = match self {
            Self::JoinChat(join) => serde_json::to_value(join)?,
            Self::LeaveChat => Value::Object(serde_json::Map::new()),
            Self::SendMessage(send) => serde_json::to_value(send)?,
        };
        Ok(SocketPacket::event(self.name(), payload))
    }

    /// Parse a client event out of a Socket.IO packet (server side).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the packet is not an event
    /// - `ProtocolError::UnknownEvent` for names outside the client set
    /// - `ProtocolError::InvalidPayload` if the payload shape is wrong
    pub fn from_packet(packet: &SocketPacket) -> Result<Self> {
        let (name, payload) = event_parts(packet)?;
        match name {
            JOIN_CHAT => Ok(Self::JoinChat(decode_payload(name, payload)?)),
            LEAVE_CHAT => Ok(Self::LeaveChat),
            SEND_MESSAGE => Ok(Self::SendMessage(decode_payload(name, payload)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }
}

/// Events the server pushes to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Acknowledges a `join_chat`.
    ChatParticipantJoined,
    /// Message posted in the joined room.
    NewMessage(MessagePayload),
    /// Message posted in a conversation, for chat lists outside the room.
    UpdateChat(MessagePayload),
}

impl ServerEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Listener kind matching this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChatParticipantJoined => EventKind::ChatParticipantJoined,
            Self::NewMessage(_) => EventKind::NewMessage,
            Self::UpdateChat(_) => EventKind::UpdateChat,
        }
    }

    /// Conversation this event concerns. `None` for the join ack.
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::ChatParticipantJoined => None,
            Self::NewMessage(payload) | Self::UpdateChat(payload) => Some(payload.chat_id),
        }
    }

    /// Build the Socket.IO event packet (server side).
    pub fn to_packet(&self) -> Result<SocketPacket> {
        let payload = match self {
            Self::ChatParticipantJoined => Value::Object(serde_json::Map::new()),
            Self::NewMessage(message) | Self::UpdateChat(message) => {
                serde_json::to_value(message)?
            },
        };
        Ok(SocketPacket::event(self.name(), payload))
    }

    /// Parse a server event out of a Socket.IO packet.
    ///
    /// The join acknowledgement's payload is ignored whatever its shape.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the packet is not an event
    /// - `ProtocolError::UnknownEvent` for names outside the server set
    /// - `ProtocolError::InvalidPayload` if the payload shape is wrong
    pub fn from_packet(packet: &SocketPacket) -> Result<Self> {
        let (name, payload) = event_parts(packet)?;
        match name {
            CHAT_PARTICIPANT_JOINED => Ok(Self::ChatParticipantJoined),
            NEW_MESSAGE => Ok(Self::NewMessage(decode_payload(name, payload)?)),
            UPDATE_CHAT => Ok(Self::UpdateChat(decode_payload(name, payload)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }
}

/// Kinds of inbound notifications a listener can register for.
///
/// Covers the server events plus the transport lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Transport connected (or reconnected).
    Connect,
    /// Transport dropped or was closed.
    Disconnect,
    /// `chat_participant_joined`.
    ChatParticipantJoined,
    /// `new_message`.
    NewMessage,
    /// `update_chat`.
    UpdateChat,
}

impl EventKind {
    /// Wire (or lifecycle) name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ChatParticipantJoined => CHAT_PARTICIPANT_JOINED,
            Self::NewMessage => NEW_MESSAGE,
            Self::UpdateChat => UPDATE_CHAT,
        }
    }

    /// Look up a kind by name. `None` if the name is not an inbound event.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(Self::Connect),
            "disconnect" => Some(Self::Disconnect),
            CHAT_PARTICIPANT_JOINED => Some(Self::ChatParticipantJoined),
            NEW_MESSAGE => Some(Self::NewMessage),
            UPDATE_CHAT => Some(Self::UpdateChat),
            _ => None,
        }
    }
}

fn event_parts(packet: &SocketPacket) -> Result<(&str, Option<&Value>)> {
    packet
        .event_parts()?
        .ok_or_else(|| ProtocolError::Malformed("expected an event packet".into()))
}

fn decode_payload<T: DeserializeOwned>(event: &str, payload: Option<&Value>) -> Result<T> {
    let value = payload.ok_or_else(|| ProtocolError::InvalidPayload {
        event: event.to_owned(),
        reason: "missing payload".into(),
    })?;
    serde_json::from_value(value.clone()).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_owned(),
        reason: e.to_string(),
    })
}
