//! Error types for the Lectern connection layer.
//!
//! Connection errors describe why the socket could not carry an event or why
//! a live link was torn down. Drops feed the reconnection policy instead of
//! surfacing to callers; only emits on a dead link are returned as errors.

use std::time::Duration;

use lectern_proto::ProtocolError;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Emit attempted while the namespace is not connected.
    #[error("not connected: cannot emit in state {state:?}")]
    NotConnected {
        /// State at the time of the emit.
        state: ConnectionState,
    },

    /// Packet arrived that the current state does not expect.
    #[error("unexpected {packet} packet in state {state:?}")]
    UnexpectedPacket {
        /// Current state when the packet arrived.
        state: ConnectionState,
        /// Packet description.
        packet: &'static str,
    },

    /// Socket open or namespace handshake did not finish in time.
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// Server stopped pinging.
    #[error("ping timeout after {elapsed:?}")]
    PingTimeout {
        /// Silence observed.
        elapsed: Duration,
    },

    /// Server refused the namespace connection.
    #[error("connection refused: {0}")]
    Refused(String),

    /// Malformed packet from the server.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying socket failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Timeouts and socket failures are transient. A refused namespace or a
    /// malformed packet will not improve by reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::PingTimeout { .. } | Self::Transport(_)
        )
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_socket_failures_are_transient() {
        assert!(ConnectionError::HandshakeTimeout { elapsed: Duration::from_secs(21) }.is_transient());
        assert!(ConnectionError::PingTimeout { elapsed: Duration::from_secs(46) }.is_transient());
        assert!(ConnectionError::Transport("reset by peer".into()).is_transient());
    }

    #[test]
    fn refusals_and_protocol_violations_are_fatal() {
        assert!(!ConnectionError::Refused("unauthorized".into()).is_transient());
        assert!(!ConnectionError::Protocol("bad packet".into()).is_transient());
        assert!(
            !ConnectionError::NotConnected { state: ConnectionState::Idle }.is_transient()
        );
        assert!(
            !ConnectionError::UnexpectedPacket { state: ConnectionState::Idle, packet: "open" }
                .is_transient()
        );
    }

    #[test]
    fn protocol_errors_convert() {
        let err: ConnectionError = ProtocolError::EmptyPacket.into();
        assert_eq!(err, ConnectionError::Protocol("empty packet".into()));
    }
}
