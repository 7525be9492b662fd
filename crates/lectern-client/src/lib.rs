//! Client
//!
//! Chat session manager for the Lectern learning platform: connects to the
//! chat server, joins and leaves rooms, sends and receives messages, and
//! keeps per-conversation state (messages, unread counters, previews)
//! consistent across every view that shows it.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and Action-Based patterns as
//! [`lectern_core`]. [`Session`] receives operations and [`SessionEvent`]s,
//! updates the [`ConversationStore`], and returns [`SessionAction`]s.
//! [`ChatRuntime`] executes those actions against a [`Transport`] and a
//! [`ChatApi`].
//!
//! # Components
//!
//! - [`ConversationStore`]: addressable conversation state with subscriptions
//! - [`RoomTracker`]: the single joined room and its `join_chat`/`leave_chat`
//! - [`MessageReconciler`]: optimistic sends, echo matching, dedupe, unread
//! - [`Session`]: per-screen facade state machine
//! - [`ChatRuntime`]: async driver sharing the store between views
//!
//! # Adapters (optional)
//!
//! - `websocket`: [`websocket::WebSocketTransport`], Socket.IO over
//!   tokio-tungstenite
//! - `http`: [`http::HttpApi`], the REST collaborator over reqwest

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod api;
mod error;
mod event;
mod listeners;
mod model;
mod reconciler;
mod room;
mod runtime;
mod session;
mod store;
mod system_env;
mod transport;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use api::{ApiCall, ApiRequest, ApiResponse, ChatApi, GroupEdit, RequestId, execute};
pub use error::{ApiError, ChatError, SessionError, TransportError};
pub use event::{SessionAction, SessionEvent};
pub use lectern_core::{ConnectOptions, Environment};
pub use lectern_proto::{ChatId, ClientEvent, EventKind, MessageId, ParticipantId, ServerEvent};
pub use listeners::{ListenerId, Listeners, Notification};
pub use model::{
    Conversation, ConversationDetails, DeliveryState, LocalId, Message, MessagePreview, NewGroup,
    Participant, UserSummary,
};
pub use reconciler::{InboundOutcome, InboundSource, MessageReconciler, Outbound};
pub use room::{RoomState, RoomTarget, RoomTracker};
pub use runtime::ChatRuntime;
pub use session::{FIRST_HISTORY_PAGE, Session, SessionConfig};
pub use store::{ConversationStore, SharedStore, SubscriptionId};
pub use system_env::SystemEnv;
pub use transport::{Transport, TransportEvent};
