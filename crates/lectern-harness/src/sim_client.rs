//! Simulated client.
//!
//! A [`ChatRuntime`] wired to a [`FakeTransport`], a [`StaticApi`] and a
//! [`SimEnv`], with the handles a test needs to script the server side and
//! inspect the result.

use lectern_client::{ChatError, ChatRuntime, ConversationStore, SessionConfig, SharedStore};

use crate::{
    fake_transport::{FakeTransport, FakeTransportHandle},
    invariants::{InvariantRegistry, StoreSnapshot, Violation},
    sim_env::SimEnv,
    static_api::StaticApi,
};

/// Server URL used by simulated clients.
pub const SIM_SERVER_URL: &str = "http://chat.sim";

/// Runtime type driven by the harness.
pub type SimRuntime = ChatRuntime<FakeTransport, StaticApi, SimEnv>;

/// One simulated chat screen.
#[derive(Debug)]
pub struct SimClient {
    /// The runtime under test.
    pub runtime: SimRuntime,
    /// Server-side script for the transport.
    pub transport: FakeTransportHandle,
    /// REST tables and call log.
    pub api: StaticApi,
    /// Shared clock and RNG.
    pub env: SimEnv,
}

impl SimClient {
    /// Client for the user `self_email` with a fresh store and a transport
    /// that connects immediately.
    pub fn new(self_email: &str, api: StaticApi) -> Self {
        Self::with_store(ConversationStore::new(self_email).shared(), api)
    }

    /// Client sharing `store` with other views.
    pub fn with_store(store: SharedStore, api: StaticApi) -> Self {
        let (transport, handle) = FakeTransport::auto_connecting();
        let env = SimEnv::new();
        let runtime = ChatRuntime::new(
            SessionConfig::new(SIM_SERVER_URL),
            env.clone(),
            transport,
            api.clone(),
            store,
        );
        Self { runtime, transport: handle, api, env }
    }

    /// Process scripted transport events until none are left.
    pub async fn settle(&mut self) -> Result<(), ChatError> {
        while self.runtime.pump().await? {}
        Ok(())
    }

    /// Snapshot of the store and the joined room.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let store = self.runtime.store();
        let store = store.lock().await;
        StoreSnapshot::capture(&store, self.runtime.session().active_conversation())
    }

    /// Run the standard invariants against the current state.
    pub async fn check_invariants(&self) -> Result<(), Vec<Violation>> {
        InvariantRegistry::standard().check_all(&self.snapshot().await)
    }
}
