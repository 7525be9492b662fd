//! Session events and actions.

use lectern_core::ConnectOptions;
use lectern_proto::{ClientEvent, ServerEvent};

use crate::{
    api::{ApiRequest, ApiResponse, RequestId},
    error::ApiError,
};

/// Events the runtime feeds into the session.
///
/// The runtime is responsible for:
/// - Forwarding transport lifecycle changes and server broadcasts
/// - Completing the REST requests the session asked for
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transport connected or reconnected.
    Connected,

    /// Transport dropped; reconnection may follow.
    Disconnected {
        /// Why the link was lost.
        reason: String,
    },

    /// Reconnection attempts exhausted.
    Unavailable {
        /// Description for the user.
        reason: String,
    },

    /// Server broadcast.
    Server(ServerEvent),

    /// A requested REST call completed.
    Response {
        /// Request being answered.
        id: RequestId,
        /// Outcome of the call.
        result: Result<ApiResponse, ApiError>,
    },
}

/// Actions the session produces for the runtime to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Open the transport.
    Connect {
        /// Server base URL.
        url: String,
        /// Connection options.
        options: ConnectOptions,
    },

    /// Emit a protocol event. Fire-and-forget.
    Emit(ClientEvent),

    /// Close the transport.
    Disconnect,

    /// Make a REST call and feed back a [`SessionEvent::Response`].
    Request(ApiRequest),

    /// Something failed that the user may want to know about.
    Error {
        /// Human-readable description.
        message: String,
    },

    /// Chat is unavailable until the next join.
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
}
