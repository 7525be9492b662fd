//! Lectern core
//!
//! Sans-IO building blocks shared by the chat client and its test harness.
//!
//! # Components
//!
//! - [`env::Environment`]: time, randomness and wall clock, injected so that
//!   simulation runs are deterministic
//! - [`connection::Connection`]: Socket.IO connection lifecycle with
//!   reconnection policy and heartbeat supervision
//! - [`error::ConnectionError`]: connection failures and their
//!   transient/fatal classification
//!
//! Nothing here performs I/O. State machines take the current time as input
//! and return actions for a driver to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;

pub use connection::{
    ConnectOptions, Connection, ConnectionAction, ConnectionState, TransportKind, socket_url,
};
pub use env::Environment;
pub use error::ConnectionError;
