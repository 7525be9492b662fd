//! Client error types.

use lectern_core::ConnectionError;
use lectern_proto::{ChatId, ParticipantId};
use thiserror::Error;

/// Requests rejected locally, before anything reaches the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Message text is empty or whitespace.
    #[error("message is empty")]
    EmptyMessage,

    /// Group name is empty or whitespace.
    #[error("group name is empty")]
    EmptyGroupName,

    /// Operation needs a joined conversation.
    #[error("no conversation joined")]
    NotJoined,

    /// The local user is not in the conversation's roster.
    #[error("not a participant of conversation {chat_id}")]
    NotParticipant {
        /// Conversation concerned.
        chat_id: ChatId,
    },

    /// Group operation on a private chat.
    #[error("conversation {chat_id} is not a group")]
    NotGroup {
        /// Conversation concerned.
        chat_id: ChatId,
    },

    /// Group operation without admin rights.
    #[error("not an admin of conversation {chat_id}")]
    NotPermitted {
        /// Conversation concerned.
        chat_id: ChatId,
    },

    /// Target participant is not in the roster.
    #[error("participant {participant_id} not in conversation {chat_id}")]
    UnknownParticipant {
        /// Conversation concerned.
        chat_id: ChatId,
        /// Missing participant.
        participant_id: ParticipantId,
    },
}

/// REST collaborator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Server answered with an error status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Request never got an answer.
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns true for failures that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Network(_) => true,
            Self::Decode(_) => false,
        }
    }
}

/// Transport adapter failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection state machine rejected the operation.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Transport task is gone.
    #[error("transport closed")]
    Closed,

    /// Operation needs `connect` first.
    #[error("transport not started")]
    NotStarted,
}

/// Errors surfaced by [`crate::ChatRuntime`].
#[derive(Error, Debug)]
pub enum ChatError {
    /// Local rejection.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// REST failure on a call the caller waits for.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(ApiError::Status { status: 503, message: String::new() }.is_transient());
        assert!(ApiError::Status { status: 429, message: String::new() }.is_transient());
        assert!(ApiError::Network("timeout".into()).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!ApiError::Status { status: 404, message: "no chat".into() }.is_transient());
        assert!(!ApiError::Decode("missing id".into()).is_transient());
    }

    #[test]
    fn errors_render_for_logs() {
        let err = ChatError::from(SessionError::NotPermitted { chat_id: 8 });
        assert_eq!(err.to_string(), "not an admin of conversation 8");

        let err = TransportError::from(ConnectionError::Transport("reset".into()));
        assert_eq!(err.to_string(), "transport error: reset");
    }
}
