//! Socket.IO connection state machine.
//!
//! Manages socket open, namespace handshake, heartbeats, drops and
//! reconnection. Uses the action pattern: methods take time as input and
//! return actions for the driver to execute. The driver owns the actual
//! WebSocket.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ connect ┌─────────┐ 0{open} ┌─────────────┐ 40{sid} ┌───────────┐
//! │ Idle │────────>│ Opening │────────>│ Handshaking │────────>│ Connected │
//! └──────┘         └─────────┘         └─────────────┘         └───────────┘
//!     ^                 ^   │                 │                      │
//!     │ disconnect      │   └──────── drop / timeout ────────────────┤
//!     │                 │ delay elapsed       │                      │
//!     │            ┌─────────┐<───────────────┘ attempts left        │
//!     └────────────│ Backoff │<──────────────────────────────────────┘
//!                  └─────────┘
//!                       │ attempts exhausted
//!                       ↓
//!                 ┌─────────────┐
//!                 │ Unavailable │
//!                 └─────────────┘
//! ```
//!
//! Emits are only accepted in `Connected`. There is no outbound queue: an
//! emit on a dead link is rejected and the caller decides what to show.

use std::time::Duration;

use lectern_proto::{ClientEvent, ENGINE_PROTOCOL, EnginePacket, ServerEvent, SocketPacket};

use crate::{env::Environment, error::ConnectionError};

/// Default number of reconnection attempts after a drop.
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);

/// Default cap on the exponential reconnection delay.
pub const DEFAULT_RECONNECTION_DELAY_MAX: Duration = Duration::from_millis(5000);

/// Default jitter applied to reconnection delays (fraction of the delay).
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Default time allowed to open the socket and finish the namespace handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Underlying transport. The chat backend is only reached over WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Plain WebSocket, no long-polling fallback.
    #[default]
    Websocket,
}

impl TransportKind {
    /// Engine.IO query value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
        }
    }
}

/// Connection options.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Transport to use.
    pub transport: TransportKind,
    /// Reconnect automatically after a drop.
    pub reconnection: bool,
    /// Attempts before giving up and reporting the chat unavailable.
    pub reconnection_attempts: u32,
    /// Delay before the first attempt; doubles on every further attempt.
    pub reconnection_delay: Duration,
    /// Upper bound on the reconnection delay.
    pub reconnection_delay_max: Duration,
    /// Jitter as a fraction of the delay, in `[0, 1]`.
    pub randomization_factor: f64,
    /// Time allowed for socket open plus namespace handshake.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            transport: TransportKind::Websocket,
            reconnection: true,
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            reconnection_delay_max: DEFAULT_RECONNECTION_DELAY_MAX,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectOptions {
    /// Delay before reconnection attempt `attempt` (zero-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.reconnection_delay.saturating_mul(factor).min(self.reconnection_delay_max)
    }
}

/// Build the Engine.IO WebSocket URL for a server base URL.
///
/// `http`/`https` map to `ws`/`wss`; a bare host is treated as `ws`.
pub fn socket_url(server_url: &str, transport: TransportKind) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_owned()
    } else {
        format!("ws://{base}")
    };
    format!("{base}/socket.io/?EIO={ENGINE_PROTOCOL}&transport={}", transport.as_str())
}

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a WebSocket to this URL.
    OpenSocket {
        /// Engine.IO WebSocket URL.
        url: String,
    },
    /// Send this text frame.
    SendText(String),
    /// Close the WebSocket.
    CloseSocket,
    /// Namespace connected; emits are accepted from now on.
    Connected {
        /// Socket.IO session id, if the server sent one.
        sid: Option<String>,
    },
    /// A connected link was lost.
    Disconnected {
        /// Why the link was lost.
        reason: String,
    },
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Reconnection gave up. The chat is unavailable until `connect` is
    /// called again.
    Unavailable {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Server event to hand to listeners.
    Deliver(ServerEvent),
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, no reconnection pending.
    Idle,
    /// Socket requested, waiting for the Engine.IO handshake.
    Opening,
    /// Engine.IO open, waiting for the namespace connect reply.
    Handshaking,
    /// Namespace connected.
    Connected,
    /// Link lost, waiting to retry.
    Backoff,
    /// Reconnection attempts exhausted.
    Unavailable,
}

/// Socket.IO connection state machine.
///
/// Pure state machine: no I/O. Time is passed to every method that needs it.
/// The environment only supplies jitter for reconnection delays.
#[derive(Debug, Clone)]
pub struct Connection<E: Environment> {
    env: E,
    options: ConnectOptions,
    state: ConnectionState,
    /// Engine.IO URL of the current target. `None` before the first connect.
    url: Option<String>,
    /// Reconnection attempts made in the current outage.
    attempt: u32,
    /// When the current open attempt started.
    opened_at: Option<E::Instant>,
    /// Last inbound traffic.
    last_activity: Option<E::Instant>,
    /// When the current backoff started and how long it lasts.
    backoff: Option<(E::Instant, Duration)>,
    /// Ping interval plus ping timeout from the handshake.
    liveness: Option<Duration>,
    /// Socket.IO session id.
    sid: Option<String>,
}

impl<E: Environment> Connection<E> {
    /// Create a connection in [`ConnectionState::Idle`].
    pub fn new(env: E, options: ConnectOptions) -> Self {
        Self {
            env,
            options,
            state: ConnectionState::Idle,
            url: None,
            attempt: 0,
            opened_at: None,
            last_activity: None,
            backoff: None,
            liveness: None,
            sid: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once the namespace handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Socket.IO session id. `None` if not connected.
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Connection options in use.
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Start connecting to `server_url`.
    ///
    /// No-op unless idle or unavailable: a connection in progress or in
    /// backoff keeps its current target.
    pub fn connect(&mut self, server_url: &str, now: E::Instant) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Unavailable => {
                let url = socket_url(server_url, self.options.transport);
                self.url = Some(url.clone());
                self.attempt = 0;
                self.backoff = None;
                self.open(now, url)
            },
            ConnectionState::Opening
            | ConnectionState::Handshaking
            | ConnectionState::Connected
            | ConnectionState::Backoff => vec![],
        }
    }

    /// Encode an event for sending.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless the namespace is connected;
    ///   the event is dropped
    /// - `ConnectionError::Protocol` if the event cannot be serialized
    pub fn emit(&self, event: &ClientEvent) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected { state: self.state });
        }

        Ok(vec![ConnectionAction::SendText(event.to_packet()?.frame())])
    }

    /// Close the link on request. Idempotent.
    ///
    /// After this returns, inbound text is ignored until the next `connect`.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let actions = match self.state {
            ConnectionState::Connected => vec![
                ConnectionAction::SendText(SocketPacket::disconnect().frame()),
                ConnectionAction::CloseSocket,
            ],
            ConnectionState::Opening | ConnectionState::Handshaking => {
                vec![ConnectionAction::CloseSocket]
            },
            ConnectionState::Idle | ConnectionState::Backoff | ConnectionState::Unavailable => {
                vec![]
            },
        };

        self.state = ConnectionState::Idle;
        self.attempt = 0;
        self.backoff = None;
        self.sid = None;
        actions
    }

    /// Process one inbound WebSocket text frame.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Protocol` for undecodable packets or unknown events
    /// - `ConnectionError::UnexpectedPacket` for packets out of sequence
    ///
    /// Errors leave the state unchanged; the caller logs and continues.
    pub fn handle_text(
        &mut self,
        text: &str,
        now: E::Instant,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !self.socket_open() {
            tracing::trace!(state = ?self.state, "ignoring text on closed link");
            return Ok(vec![]);
        }

        self.last_activity = Some(now);

        match EnginePacket::decode(text)? {
            EnginePacket::Open(handshake) => {
                if self.state != ConnectionState::Opening {
                    return Err(ConnectionError::UnexpectedPacket {
                        state: self.state,
                        packet: "open",
                    });
                }
                self.liveness = Some(handshake.liveness_window());
                self.state = ConnectionState::Handshaking;
                Ok(vec![ConnectionAction::SendText(SocketPacket::connect().frame())])
            },
            EnginePacket::Ping => Ok(vec![ConnectionAction::SendText(EnginePacket::Pong.encode()?)]),
            EnginePacket::Pong | EnginePacket::Noop | EnginePacket::Upgrade => Ok(vec![]),
            EnginePacket::Close => Ok(self.drop_link(now, "server closed transport".into(), true)),
            EnginePacket::Message(body) => {
                let packet = SocketPacket::decode(&body)?;
                self.handle_socket_packet(packet, now)
            },
        }
    }

    /// The WebSocket closed underneath us.
    pub fn handle_socket_closed(&mut self, now: E::Instant, reason: &str) -> Vec<ConnectionAction> {
        if !self.socket_open() {
            return vec![];
        }
        self.drop_link(now, ConnectionError::Transport(reason.to_owned()).to_string(), false)
    }

    /// Advance time: fire due reconnections and detect timeouts.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Backoff => {
                let due = self.backoff.is_none_or(|(started, delay)| now - started >= delay);
                match self.url.clone() {
                    Some(url) if due => self.open(now, url),
                    _ => vec![],
                }
            },
            ConnectionState::Opening | ConnectionState::Handshaking => {
                let elapsed = self.opened_at.map_or(Duration::ZERO, |opened| now - opened);
                if elapsed >= self.options.connect_timeout {
                    let reason = ConnectionError::HandshakeTimeout { elapsed }.to_string();
                    self.drop_link(now, reason, true)
                } else {
                    vec![]
                }
            },
            ConnectionState::Connected => {
                let silence = self.last_activity.map_or(Duration::ZERO, |last| now - last);
                match self.liveness {
                    Some(window) if silence > window => {
                        let reason = ConnectionError::PingTimeout { elapsed: silence }.to_string();
                        self.drop_link(now, reason, true)
                    },
                    _ => vec![],
                }
            },
            ConnectionState::Idle | ConnectionState::Unavailable => vec![],
        }
    }

    fn socket_open(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Opening | ConnectionState::Handshaking | ConnectionState::Connected
        )
    }

    fn open(&mut self, now: E::Instant, url: String) -> Vec<ConnectionAction> {
        self.state = ConnectionState::Opening;
        self.opened_at = Some(now);
        self.last_activity = Some(now);
        self.liveness = None;
        self.sid = None;
        tracing::debug!(%url, attempt = self.attempt, "opening socket");
        vec![ConnectionAction::OpenSocket { url }]
    }

    fn handle_socket_packet(
        &mut self,
        packet: SocketPacket,
        now: E::Instant,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match packet {
            SocketPacket::Connect { data, .. } => {
                if self.state != ConnectionState::Handshaking {
                    return Err(ConnectionError::UnexpectedPacket {
                        state: self.state,
                        packet: "connect",
                    });
                }
                let sid = data
                    .as_ref()
                    .and_then(|d| d.get("sid"))
                    .and_then(|sid| sid.as_str())
                    .map(str::to_owned);
                self.state = ConnectionState::Connected;
                self.attempt = 0;
                self.sid.clone_from(&sid);
                tracing::info!(sid = ?sid, "socket connected");
                Ok(vec![ConnectionAction::Connected { sid }])
            },
            SocketPacket::Event { .. } => {
                if self.state != ConnectionState::Connected {
                    return Err(ConnectionError::UnexpectedPacket {
                        state: self.state,
                        packet: "event",
                    });
                }
                let event = ServerEvent::from_packet(&packet)?;
                Ok(vec![ConnectionAction::Deliver(event)])
            },
            SocketPacket::Disconnect { .. } => {
                Ok(self.drop_link(now, "server disconnected namespace".into(), true))
            },
            SocketPacket::ConnectError { data, .. } => {
                let message = data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("no reason given")
                    .to_owned();
                let reason = ConnectionError::Refused(message).to_string();
                Ok(self.drop_link(now, reason, true))
            },
            SocketPacket::Ack { .. } => Ok(vec![]),
        }
    }

    fn drop_link(&mut self, now: E::Instant, reason: String, close: bool) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if close {
            actions.push(ConnectionAction::CloseSocket);
        }
        if self.state == ConnectionState::Connected {
            actions.push(ConnectionAction::Disconnected { reason: reason.clone() });
        }
        self.sid = None;

        if self.options.reconnection && self.attempt < self.options.reconnection_attempts {
            let delay = self.jittered(self.options.backoff(self.attempt));
            self.attempt += 1;
            self.state = ConnectionState::Backoff;
            self.backoff = Some((now, delay));
            tracing::warn!(%reason, attempt = self.attempt, ?delay, "link lost, reconnecting");
            actions.push(ConnectionAction::Reconnecting { attempt: self.attempt, delay });
        } else {
            self.state = ConnectionState::Unavailable;
            self.backoff = None;
            tracing::error!(%reason, attempts = self.attempt, "link lost, giving up");
            actions.push(ConnectionAction::Unavailable { attempts: self.attempt });
        }
        actions
    }

    #[allow(clippy::cast_precision_loss)]
    fn jittered(&self, delay: Duration) -> Duration {
        let factor = self.options.randomization_factor.clamp(0.0, 1.0);
        if factor <= 0.0 {
            return delay;
        }

        let entropy = self.env.random_u64();
        let unit = (entropy >> 11) as f64 / (1u64 << 53) as f64;
        let deviation = delay.mul_f64(factor * unit);
        let jittered =
            if entropy & 1 == 0 { delay.saturating_sub(deviation) } else { delay + deviation };
        jittered.min(self.options.reconnection_delay_max)
    }
}
