//! Deterministic simulation harness for Lectern chat sessions.
//!
//! In-memory implementations of the Environment, Transport and REST
//! collaborator seams, so that sessions and runtimes can be tested without
//! sockets, servers or real time.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties of the conversation store that
//! must hold after every transition. Use [`InvariantRegistry::standard()`]
//! for the common set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fake_transport;
pub mod invariants;
pub mod sim_client;
pub mod sim_env;
pub mod static_api;

pub use fake_transport::{FakeTransport, FakeTransportHandle};
pub use invariants::{
    ActiveRoomInStore, FocusedHasNoUnread, Invariant, InvariantRegistry, InvariantResult,
    PreviewMatchesMessages, StoreSnapshot, UnconfirmedAreOwn, UniqueMessageIds,
    UniqueParticipants, Violation,
};
pub use sim_client::{SIM_SERVER_URL, SimClient, SimRuntime};
pub use sim_env::{SimEnv, SimInstant};
pub use static_api::{FIRST_CREATED_CHAT, RecordedCall, StaticApi};
