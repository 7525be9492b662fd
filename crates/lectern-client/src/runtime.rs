//! Async runtime for a chat session.
//!
//! [`ChatRuntime`] drives one [`Session`], coordinating between:
//! - [`Transport`]: the socket (WebSocket in production, fake in tests)
//! - [`ChatApi`]: the REST collaborator
//! - [`SharedStore`]: conversation state shared with other views
//!
//! The store lock is taken for one synchronous session transition at a time
//! and never held across an await.

use std::collections::VecDeque;

use futures::future::join_all;
use lectern_core::Environment;
use lectern_proto::{ChatId, EventKind, ParticipantId};

use crate::{
    api::{self, ApiRequest, ChatApi},
    error::ChatError,
    event::{SessionAction, SessionEvent},
    listeners::{ListenerId, Listeners, Notification},
    model::{Conversation, NewGroup, UserSummary},
    session::{Session, SessionConfig},
    store::{SharedStore, SubscriptionId},
    transport::{Transport, TransportEvent},
};

/// Runtime for one mounted chat screen.
///
/// # Type Parameters
///
/// - `T`: socket transport
/// - `A`: REST collaborator
/// - `E`: environment (clock and randomness)
pub struct ChatRuntime<T, A, E>
where
    T: Transport,
    A: ChatApi,
    E: Environment,
{
    session: Session<E>,
    store: SharedStore,
    transport: T,
    api: A,
    listeners: Listeners,
    status: Option<String>,
    last_error: Option<String>,
}

impl<T, A, E> ChatRuntime<T, A, E>
where
    T: Transport,
    A: ChatApi,
    E: Environment,
{
    /// Create a runtime. Nothing connects until the first join.
    pub fn new(config: SessionConfig, env: E, transport: T, api: A, store: SharedStore) -> Self {
        Self {
            session: Session::new(config, env),
            store,
            transport,
            api,
            listeners: Listeners::new(),
            status: None,
            last_error: None,
        }
    }

    /// Shared conversation store.
    pub fn store(&self) -> SharedStore {
        SharedStore::clone(&self.store)
    }

    /// Underlying session state machine.
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// Transport in use.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// "Chat unavailable" message after reconnection gave up. Cleared by
    /// the next join.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Most recent background failure (fetch, group edit).
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Enter a conversation. Returns once details and the first history page
    /// have been fetched; `join_chat` goes out as soon as the transport is
    /// connected.
    pub async fn join_conversation(&mut self, chat_id: ChatId) -> Result<(), ChatError> {
        self.status = None;
        let actions = {
            let mut store = self.store.lock().await;
            self.session.join_conversation(&mut store, chat_id)
        };
        self.execute(actions).await
    }

    /// Open the transport without joining a room, for chat-list screens.
    pub async fn connect(&mut self) -> Result<(), ChatError> {
        self.status = None;
        let actions = self.session.connect();
        self.execute(actions).await
    }

    /// Leave the conversation and close the transport. Idempotent.
    pub async fn leave_conversation(&mut self) -> Result<(), ChatError> {
        let actions = {
            let mut store = self.store.lock().await;
            self.session.leave_conversation(&mut store)
        };
        self.execute(actions).await
    }

    /// Send a message to the joined conversation. Never waits on the server.
    pub async fn send_message(&mut self, text: &str) -> Result<(), ChatError> {
        let actions = {
            let mut store = self.store.lock().await;
            self.session.send_message(&mut store, text)?
        };
        self.execute(actions).await
    }

    /// Mark a conversation as shown or hidden.
    pub async fn set_focus(&mut self, chat_id: ChatId, focused: bool) {
        let mut store = self.store.lock().await;
        self.session.set_focus(&mut store, chat_id, focused);
    }

    /// Fetch a history page of the current conversation.
    pub async fn load_history(&mut self, page: u32) -> Result<(), ChatError> {
        let actions = self.session.load_history(page)?;
        self.execute(actions).await
    }

    /// Subscribe to changes of the current conversation.
    pub async fn on_update(
        &mut self,
        callback: impl FnMut(&Conversation) + Send + 'static,
    ) -> Result<SubscriptionId, ChatError> {
        let mut store = self.store.lock().await;
        Ok(self.session.on_update(&mut store, callback)?)
    }

    /// Drop a subscription made with [`Self::on_update`].
    pub async fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.store.lock().await.unsubscribe(subscription)
    }

    /// Rename the joined group. The store changes once the server accepts.
    pub async fn rename_group(&mut self, name: &str) -> Result<(), ChatError> {
        let actions = {
            let store = self.store.lock().await;
            self.session.rename_group(&store, name)?
        };
        self.execute(actions).await
    }

    /// Change the joined group's picture.
    pub async fn change_group_picture(&mut self, url: &str) -> Result<(), ChatError> {
        let actions = {
            let store = self.store.lock().await;
            self.session.change_group_picture(&store, url)?
        };
        self.execute(actions).await
    }

    /// Make a member of the joined group an admin.
    pub async fn promote_participant(&mut self, participant_id: ParticipantId) -> Result<(), ChatError> {
        let actions = {
            let store = self.store.lock().await;
            self.session.promote_participant(&store, participant_id)?
        };
        self.execute(actions).await
    }

    /// Remove a member from the joined group.
    pub async fn remove_participant(&mut self, participant_id: ParticipantId) -> Result<(), ChatError> {
        let actions = {
            let store = self.store.lock().await;
            self.session.remove_participant(&store, participant_id)?
        };
        self.execute(actions).await
    }

    /// Search the participant directory.
    pub async fn search_participants(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<UserSummary>, ChatError> {
        Ok(self.api.search_participants(query, page, limit).await?)
    }

    /// Create a group and add it to the store. Returns its id.
    pub async fn create_group(&self, group: &NewGroup) -> Result<ChatId, ChatError> {
        let details = self.api.create_group(group).await?;
        let chat_id = details.id;
        self.store.lock().await.upsert_details(details);
        tracing::info!(chat_id, name = %group.name, "group created");
        Ok(chat_id)
    }

    /// Snapshot of the chat list, newest first.
    pub async fn chat_list(&self) -> Vec<Conversation> {
        self.store.lock().await.chat_list().into_iter().cloned().collect()
    }

    /// Register a listener for one event kind.
    pub fn on(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(Notification<'_>) + Send + 'static,
    ) -> ListenerId {
        self.listeners.on(kind, handler)
    }

    /// Remove a listener.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    /// Wait for the next transport event. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.transport.next_event().await
    }

    /// Process one transport event: listeners first, then the session.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), ChatError> {
        if let Some(notification) = Notification::from_transport(&event) {
            self.listeners.dispatch(notification);
        }

        let event = match event {
            TransportEvent::Connected => SessionEvent::Connected,
            TransportEvent::Disconnected { reason } => SessionEvent::Disconnected { reason },
            TransportEvent::Unavailable { attempts } => SessionEvent::Unavailable {
                reason: format!("chat unavailable after {attempts} reconnection attempts"),
            },
            TransportEvent::Server(event) => SessionEvent::Server(event),
        };

        let actions = {
            let mut store = self.store.lock().await;
            self.session.handle(&mut store, event)
        };
        self.execute(actions).await
    }

    /// Wait for and process one transport event. Returns false once the
    /// transport is closed.
    pub async fn pump(&mut self) -> Result<bool, ChatError> {
        match self.next_event().await {
            Some(event) => {
                self.handle_transport_event(event).await?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Execute actions until the session stops producing them. Requests
    /// issued together run concurrently.
    async fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), ChatError> {
        let mut queue: VecDeque<SessionAction> = actions.into();

        while !queue.is_empty() {
            let mut requests: Vec<ApiRequest> = Vec::new();

            while let Some(action) = queue.pop_front() {
                match action {
                    SessionAction::Connect { url, options } => {
                        if let Err(err) = self.transport.connect(&url, &options).await {
                            tracing::error!(%url, %err, "transport failed to start");
                            let mut store = self.store.lock().await;
                            let reason = format!("chat unavailable: {err}");
                            queue.extend(
                                self.session.handle(&mut store, SessionEvent::Unavailable { reason }),
                            );
                        }
                    },
                    SessionAction::Emit(event) => {
                        let name = event.name();
                        if let Err(err) = self.transport.emit(event).await {
                            tracing::warn!(event = name, %err, "emit dropped");
                        }
                    },
                    SessionAction::Disconnect => self.transport.disconnect().await,
                    SessionAction::Request(request) => requests.push(request),
                    SessionAction::Error { message } => {
                        tracing::warn!(%message, "session error");
                        self.last_error = Some(message);
                    },
                    SessionAction::Unavailable { reason } => self.status = Some(reason),
                }
            }

            if requests.is_empty() {
                break;
            }

            let api: &dyn ChatApi = &self.api;
            let completions = join_all(requests.into_iter().map(|request| async move {
                let result = api::execute(api, &request.call).await;
                (request.id, result)
            }))
            .await;

            let mut store = self.store.lock().await;
            for (id, result) in completions {
                queue.extend(self.session.handle(&mut store, SessionEvent::Response { id, result }));
            }
        }
        Ok(())
    }
}

impl<T, A, E> std::fmt::Debug for ChatRuntime<T, A, E>
where
    T: Transport,
    A: ChatApi,
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRuntime")
            .field("conversation", &self.session.current_conversation())
            .field("connected", &self.session.is_connected())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
