//! Transport abstraction.
//!
//! The [`Transport`] trait decouples [`crate::ChatRuntime`] from the socket
//! implementation. Production uses [`crate::websocket::WebSocketTransport`]
//! (feature `websocket`); tests use the harness fake, which records emits
//! and replays scripted events.

use std::future::Future;

use lectern_core::ConnectOptions;
use lectern_proto::{ClientEvent, ServerEvent};

use crate::error::TransportError;

/// Lifecycle changes and broadcasts delivered by a transport, in receipt
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Namespace connected (first time or after a reconnect).
    Connected,
    /// Link lost. Reconnection follows if the policy allows.
    Disconnected {
        /// Why the link was lost.
        reason: String,
    },
    /// Reconnection attempts exhausted.
    Unavailable {
        /// Attempts made.
        attempts: u32,
    },
    /// Server broadcast.
    Server(ServerEvent),
}

/// Persistent socket to the chat server.
///
/// # Contract
///
/// - `emit` is fire-and-forget; events emitted while the link is down are
///   dropped, not queued
/// - after `disconnect` returns, `next_event` yields nothing further
pub trait Transport: Send {
    /// Start connecting. Completion is reported as [`TransportEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be started at all.
    fn connect(
        &mut self,
        server_url: &str,
        options: &ConnectOptions,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event was dropped.
    fn emit(&mut self, event: ClientEvent) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next lifecycle change or broadcast. `None` once the transport is closed.
    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;

    /// Close the link. Idempotent.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}
