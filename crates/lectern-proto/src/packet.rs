//! Engine.IO and Socket.IO text packets.
//!
//! Every WebSocket text frame carries exactly one Engine.IO packet: a single
//! type digit followed by an optional body. Chat traffic rides inside
//! Engine.IO `message` packets as Socket.IO packets:
//!
//! ```text
//! 4 2 ["new_message",{"chat_id":42,...}]
//! │ │ └─ JSON body (event name + payload)
//! │ └─── Socket.IO type (2 = event)
//! └───── Engine.IO type (4 = message)
//! ```
//!
//! A non-default namespace (`/name,`) and an ack id may sit between the
//! Socket.IO type and the JSON body. Binary packets are rejected: nothing in
//! the chat protocol carries attachments.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Engine.IO protocol revision requested in the connection URL.
pub const ENGINE_PROTOCOL: u8 = 4;

/// Namespace used when a packet names none.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Server handshake carried by the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server would upgrade to. Empty over WebSocket.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,
    /// Time the server waits for a pong, in milliseconds.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// Longest silence tolerated before the connection counts as dropped.
    ///
    /// The server pings every `ping_interval`; a missing ping after a further
    /// `ping_timeout` means the link is gone.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// Engine.IO v4 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    /// Server handshake (`0`).
    Open(Handshake),
    /// Transport close (`1`).
    Close,
    /// Heartbeat probe (`2`), always sent by the server in v4.
    Ping,
    /// Heartbeat reply (`3`).
    Pong,
    /// Socket.IO payload (`4`).
    Message(String),
    /// Transport upgrade (`5`).
    Upgrade,
    /// No-op (`6`).
    Noop,
}

impl EnginePacket {
    /// Parse one WebSocket text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::EmptyPacket)?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => Ok(Self::Message(body.to_owned())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ProtocolError::UnknownPacketType { layer: "engine", kind: other }),
        }
    }

    /// Serialize into WebSocket text.
    pub fn encode(&self) -> Result<String> {
        let text = match self {
            Self::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
            Self::Close => "1".to_owned(),
            Self::Ping => "2".to_owned(),
            Self::Pong => "3".to_owned(),
            Self::Message(body) => format!("4{body}"),
            Self::Upgrade => "5".to_owned(),
            Self::Noop => "6".to_owned(),
        };
        Ok(text)
    }

    /// Wrap a Socket.IO packet in an Engine.IO message.
    pub fn message(packet: &SocketPacket) -> Self {
        Self::Message(packet.encode())
    }
}

/// Socket.IO v5 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketPacket {
    /// Namespace connect (`0`). Client sends optional auth, server replies
    /// with `{"sid": ...}`.
    Connect {
        /// Target namespace.
        namespace: String,
        /// Auth payload (client) or session info (server).
        data: Option<Value>,
    },
    /// Namespace disconnect (`1`).
    Disconnect {
        /// Namespace being left.
        namespace: String,
    },
    /// Named event (`2`). Body is `["name", args...]`.
    Event {
        /// Namespace the event belongs to.
        namespace: String,
        /// Ack id when the sender expects an acknowledgement.
        ack_id: Option<u64>,
        /// JSON array: event name followed by arguments.
        data: Value,
    },
    /// Acknowledgement (`3`) of an event that carried an ack id.
    Ack {
        /// Namespace of the acknowledged event.
        namespace: String,
        /// Ack id being answered.
        ack_id: u64,
        /// JSON array of ack arguments.
        data: Value,
    },
    /// Namespace connection refused (`4`).
    ConnectError {
        /// Namespace that refused the connection.
        namespace: String,
        /// Error details, usually `{"message": ...}`.
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Connect to the default namespace without auth.
    pub fn connect() -> Self {
        Self::Connect { namespace: DEFAULT_NAMESPACE.to_owned(), data: None }
    }

    /// Leave the default namespace.
    pub fn disconnect() -> Self {
        Self::Disconnect { namespace: DEFAULT_NAMESPACE.to_owned() }
    }

    /// Event on the default namespace with a single payload argument.
    pub fn event(name: &str, payload: Value) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            ack_id: None,
            data: Value::Array(vec![Value::String(name.to_owned()), payload]),
        }
    }

    /// Event name and first argument. `None` for non-event packets.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the body is not `["name", ...]`
    pub fn event_parts(&self) -> Result<Option<(&str, Option<&Value>)>> {
        let Self::Event { data, .. } = self else {
            return Ok(None);
        };

        let items = data
            .as_array()
            .ok_or_else(|| ProtocolError::Malformed("event body is not an array".into()))?;
        let name = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("event name missing".into()))?;

        Ok(Some((name, items.get(1))))
    }

    /// Namespace this packet is addressed to.
    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Parse the body of an Engine.IO message.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::EmptyPacket)?;
        let mut rest = chars.as_str();

        match kind {
            '0'..='4' => {},
            '5' | '6' => return Err(ProtocolError::BinaryUnsupported),
            other => return Err(ProtocolError::UnknownPacketType { layer: "socket", kind: other }),
        }

        let namespace = if rest.starts_with('/') {
            let (namespace, tail) = match rest.find(',') {
                Some(comma) => (&rest[..comma], &rest[comma + 1..]),
                None => (rest, ""),
            };
            rest = tail;
            namespace.to_owned()
        } else {
            DEFAULT_NAMESPACE.to_owned()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| ProtocolError::Malformed(format!("ack id: {e}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() { None } else { Some(serde_json::from_str::<Value>(rest)?) };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => match data {
                Some(data @ Value::Array(_)) => Ok(Self::Event { namespace, ack_id, data }),
                _ => Err(ProtocolError::Malformed("event body must be a JSON array".into())),
            },
            '3' => {
                let ack_id =
                    ack_id.ok_or_else(|| ProtocolError::Malformed("ack without id".into()))?;
                Ok(Self::Ack { namespace, ack_id, data: data.unwrap_or(Value::Array(vec![])) })
            },
            _ => Ok(Self::ConnectError { namespace, data }),
        }
    }

    /// Serialize into an Engine.IO message body.
    pub fn encode(&self) -> String {
        let (kind, ack_id, data) = match self {
            Self::Connect { data, .. } => ('0', None, data.as_ref()),
            Self::Disconnect { .. } => ('1', None, None),
            Self::Event { ack_id, data, .. } => ('2', *ack_id, Some(data)),
            Self::Ack { ack_id, data, .. } => ('3', Some(*ack_id), Some(data)),
            Self::ConnectError { data, .. } => ('4', None, data.as_ref()),
        };

        let mut out = String::new();
        out.push(kind);

        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// WebSocket text frame carrying this packet inside an Engine.IO message.
    pub fn frame(&self) -> String {
        format!("4{}", self.encode())
    }
}
