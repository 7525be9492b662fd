//! In-memory transport.
//!
//! [`FakeTransport`] implements [`Transport`] without a socket. Emits are
//! recorded; lifecycle changes and broadcasts are scripted through a
//! [`FakeTransportHandle`] that stays with the test after the transport has
//! moved into a runtime.
//!
//! `next_event` never waits: it returns `None` as soon as the script is
//! drained, so `while runtime.pump().await? {}` runs a scenario to quiescence.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use lectern_client::{Transport, TransportError, TransportEvent};
use lectern_core::ConnectOptions;
use lectern_proto::{ClientEvent, ServerEvent};

#[derive(Debug, Default)]
struct FakeState {
    connects: Vec<String>,
    emitted: Vec<ClientEvent>,
    dropped: Vec<ClientEvent>,
    disconnects: usize,
    connected: bool,
    auto_connect: bool,
    refuse_connect: bool,
    script: VecDeque<TransportEvent>,
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport double driven by a [`FakeTransportHandle`].
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

/// Test-side view of a [`FakeTransport`].
#[derive(Debug, Clone)]
pub struct FakeTransportHandle {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    /// Transport that waits for [`FakeTransportHandle::establish`] after
    /// each connect.
    pub fn new() -> (Self, FakeTransportHandle) {
        let transport = Self::default();
        let handle = FakeTransportHandle { state: Arc::clone(&transport.state) };
        (transport, handle)
    }

    /// Transport whose connects succeed immediately.
    pub fn auto_connecting() -> (Self, FakeTransportHandle) {
        let (transport, handle) = Self::new();
        lock(&transport.state).auto_connect = true;
        (transport, handle)
    }
}

impl Transport for FakeTransport {
    async fn connect(
        &mut self,
        server_url: &str,
        _options: &ConnectOptions,
    ) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.connects.push(server_url.to_owned());
        if state.refuse_connect {
            return Err(TransportError::Closed);
        }
        if state.auto_connect && !state.connected {
            state.connected = true;
            state.script.push_back(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn emit(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.connected {
            state.emitted.push(event);
            Ok(())
        } else {
            tracing::debug!(event = event.name(), "fake transport dropped emit");
            state.dropped.push(event);
            Err(TransportError::Closed)
        }
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        lock(&self.state).script.pop_front()
    }

    async fn disconnect(&mut self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.disconnects += 1;
        state.script.clear();
    }
}

impl FakeTransportHandle {
    /// Complete a pending connect.
    pub fn establish(&self) {
        let mut state = lock(&self.state);
        state.connected = true;
        state.script.push_back(TransportEvent::Connected);
    }

    /// Lose the link. The runtime sees `Disconnected`.
    pub fn drop_link(&self, reason: &str) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.script.push_back(TransportEvent::Disconnected { reason: reason.to_owned() });
    }

    /// Give up reconnecting.
    pub fn give_up(&self, attempts: u32) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.script.push_back(TransportEvent::Unavailable { attempts });
    }

    /// Queue a server broadcast.
    pub fn deliver(&self, event: ServerEvent) {
        lock(&self.state).script.push_back(TransportEvent::Server(event));
    }

    /// Make every following connect fail to start.
    pub fn refuse_connects(&self) {
        lock(&self.state).refuse_connect = true;
    }

    /// Events that reached the server, in order.
    pub fn emitted(&self) -> Vec<ClientEvent> {
        lock(&self.state).emitted.clone()
    }

    /// Events emitted while the link was down.
    pub fn dropped(&self) -> Vec<ClientEvent> {
        lock(&self.state).dropped.clone()
    }

    /// Drain [`Self::emitted`].
    pub fn take_emitted(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut lock(&self.state).emitted)
    }

    /// Server URLs passed to connect, in order.
    pub fn connects(&self) -> Vec<String> {
        lock(&self.state).connects.clone()
    }

    /// Number of disconnect calls.
    pub fn disconnects(&self) -> usize {
        lock(&self.state).disconnects
    }

    /// True while the fake link is up.
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Scripted events not yet consumed.
    pub fn queued(&self) -> usize {
        lock(&self.state).script.len()
    }
}

#[cfg(test)]
mod tests {
    use lectern_proto::JoinChat;

    use super::*;

    fn join() -> ClientEvent {
        ClientEvent::JoinChat(JoinChat { chat_id: 1, chat_participant_id: 2 })
    }

    #[tokio::test]
    async fn emits_are_dropped_until_established() {
        let (mut transport, handle) = FakeTransport::new();
        transport.connect("http://chat", &ConnectOptions::default()).await.expect("connect");

        assert!(transport.emit(join()).await.is_err());
        handle.establish();
        assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
        transport.emit(join()).await.expect("emit");

        assert_eq!(handle.emitted(), vec![join()]);
        assert_eq!(handle.dropped(), vec![join()]);
    }

    #[tokio::test]
    async fn disconnect_clears_script() {
        let (mut transport, handle) = FakeTransport::auto_connecting();
        transport.connect("http://chat", &ConnectOptions::default()).await.expect("connect");
        handle.drop_link("reset");

        transport.disconnect().await;

        assert_eq!(transport.next_event().await, None);
        assert_eq!(handle.disconnects(), 1);
        assert!(!handle.is_connected());
    }
}
