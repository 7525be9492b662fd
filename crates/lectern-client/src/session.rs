//! Session facade.
//!
//! One [`Session`] exists per mounted chat screen. It combines the room
//! tracker, the message reconciler and the conversation store behind the
//! user-facing operations (join, leave, send, subscribe) plus focus, history
//! and group administration. Chat-list screens call [`Session::connect`]
//! instead of joining.
//!
//! # Architecture
//!
//! The session is a Sans-IO state machine. Operations and [`SessionEvent`]s
//! go in, [`SessionAction`]s come out; [`crate::ChatRuntime`] executes them.
//! The store is passed in by reference for each call so that the caller
//! controls how long it is locked.
//!
//! # Join lifecycle
//!
//! ```text
//! join_conversation(42)
//!   ├─ leave previous room, unfocus it
//!   ├─ focus 42
//!   ├─ Connect (if the transport is down)
//!   ├─ Request details(42), history(42, page 1)
//!   │
//! details response
//!   ├─ store roster, resolve our participant id
//!   └─ Emit join_chat (now, or on the next Connected)
//! ```
//!
//! Every join and leave bumps a generation counter; responses to requests
//! from an older generation are ignored.

use std::collections::{BTreeSet, HashMap};

use lectern_core::{ConnectOptions, Environment};
use lectern_proto::{ChatId, ParticipantId, ServerEvent};

use crate::{
    api::{ApiCall, ApiRequest, ApiResponse, GroupEdit, RequestId},
    error::{ApiError, SessionError},
    event::{SessionAction, SessionEvent},
    model::Conversation,
    reconciler::{InboundSource, MessageReconciler},
    room::{RoomState, RoomTracker},
    store::{ConversationStore, SubscriptionId},
};

/// History page fetched when a conversation is joined.
pub const FIRST_HISTORY_PAGE: u32 = 1;

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Chat server base URL (`http`, `https`, `ws` or `wss`).
    pub server_url: String,
    /// Transport options.
    pub options: ConnectOptions,
}

impl SessionConfig {
    /// Default options for `server_url`.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self { server_url: server_url.into(), options: ConnectOptions::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Down,
    Connecting,
    Up,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    generation: u64,
    call: ApiCall,
}

/// Per-screen chat session.
#[derive(Debug)]
pub struct Session<E: Environment> {
    config: SessionConfig,
    tracker: RoomTracker,
    reconciler: MessageReconciler<E>,
    link: Link,
    /// A `Connect` went out and no `Disconnect` has followed.
    started: bool,
    generation: u64,
    /// Conversation whose details are still being fetched.
    joining: Option<ChatId>,
    /// Conversations this session focused in the store.
    focused: BTreeSet<ChatId>,
    requests: HashMap<RequestId, PendingRequest>,
    next_request: RequestId,
    history_page: u32,
}

impl<E: Environment> Session<E> {
    /// Create an idle session. Nothing happens until the first connect or
    /// join.
    pub fn new(config: SessionConfig, env: E) -> Self {
        Self {
            config,
            tracker: RoomTracker::new(),
            reconciler: MessageReconciler::new(env),
            link: Link::Down,
            started: false,
            generation: 0,
            joining: None,
            focused: BTreeSet::new(),
            requests: HashMap::new(),
            next_request: 1,
            history_page: 0,
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Conversation being joined or joined.
    pub fn current_conversation(&self) -> Option<ChatId> {
        self.joining.or_else(|| self.tracker.active_conversation())
    }

    /// Room the tracker targets. Set once details are known.
    pub fn active_conversation(&self) -> Option<ChatId> {
        self.tracker.active_conversation()
    }

    /// Room membership state.
    pub fn room_state(&self) -> RoomState {
        self.tracker.state()
    }

    /// True while the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.link == Link::Up
    }

    /// Join/leave generation. Bumped by every join and leave.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Highest history page loaded for the current conversation.
    pub fn history_page(&self) -> u32 {
        self.history_page
    }

    /// Enter a conversation, leaving the current one first.
    ///
    /// Joining the current conversation again only refocuses it (and
    /// reconnects if the chat was unavailable).
    pub fn join_conversation(
        &mut self,
        store: &mut ConversationStore,
        chat_id: ChatId,
    ) -> Vec<SessionAction> {
        if self.current_conversation() == Some(chat_id) {
            store.set_focus(chat_id, true);
            self.focused.insert(chat_id);
            return self.ensure_connecting();
        }

        let mut actions = self.release(store);
        tracing::info!(chat_id, generation = self.generation, "joining conversation");

        self.joining = Some(chat_id);
        self.focused.insert(chat_id);
        self.history_page = 0;
        store.set_focus(chat_id, true);

        actions.extend(self.ensure_connecting());
        actions.push(self.request(ApiCall::Details { chat_id }));
        actions.push(self.request(ApiCall::History { chat_id, page: FIRST_HISTORY_PAGE }));
        actions
    }

    /// Open the transport without entering a room.
    ///
    /// Chat-list screens use this to receive `update_chat`. Nothing is
    /// focused and the tracker stays idle; [`Self::leave_conversation`]
    /// closes the transport again.
    pub fn connect(&mut self) -> Vec<SessionAction> {
        self.ensure_connecting()
    }

    /// Leave the current conversation and close the transport.
    ///
    /// Idempotent, and safe before a join has completed. The transport is
    /// closed even after it reported the chat unavailable.
    pub fn leave_conversation(&mut self, store: &mut ConversationStore) -> Vec<SessionAction> {
        let mut actions = self.release(store);
        self.link = Link::Down;
        if self.started {
            self.started = false;
            self.tracker.on_disconnected();
            actions.push(SessionAction::Disconnect);
        }
        actions
    }

    /// Send a message to the joined conversation.
    ///
    /// # Errors
    ///
    /// - `SessionError::EmptyMessage` for blank text
    /// - `SessionError::NotJoined` before the join has resolved our
    ///   participant id
    pub fn send_message(
        &mut self,
        store: &mut ConversationStore,
        text: &str,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let target = self.tracker.target().ok_or(SessionError::NotJoined)?;

        let outbound = self.reconciler.record_outbound(
            store,
            target.chat_id,
            text,
            target.participant_id,
            self.is_connected(),
        )?;
        Ok(outbound.event.map(SessionAction::Emit).into_iter().collect())
    }

    /// Mark a conversation as shown or hidden.
    ///
    /// Conversations still focused by this session are unfocused on leave.
    pub fn set_focus(&mut self, store: &mut ConversationStore, chat_id: ChatId, focused: bool) {
        store.set_focus(chat_id, focused);
        if focused {
            self.focused.insert(chat_id);
        } else {
            self.focused.remove(&chat_id);
        }
    }

    /// Request a history page for the current conversation.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotJoined` without a current conversation
    pub fn load_history(&mut self, page: u32) -> Result<Vec<SessionAction>, SessionError> {
        let chat_id = self.current_conversation().ok_or(SessionError::NotJoined)?;
        let page = page.max(FIRST_HISTORY_PAGE);
        Ok(vec![self.request(ApiCall::History { chat_id, page })])
    }

    /// Register for updates of the current conversation.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotJoined` without a current conversation
    pub fn on_update(
        &self,
        store: &mut ConversationStore,
        callback: impl FnMut(&Conversation) + Send + 'static,
    ) -> Result<SubscriptionId, SessionError> {
        let chat_id = self.current_conversation().ok_or(SessionError::NotJoined)?;
        Ok(store.subscribe(chat_id, callback))
    }

    /// Rename the joined group.
    ///
    /// # Errors
    ///
    /// - `SessionError::EmptyGroupName` for a blank name
    /// - Any error from the group admin check
    pub fn rename_group(
        &mut self,
        store: &ConversationStore,
        name: &str,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let chat_id = self.admin_conversation(store)?.id;
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyGroupName);
        }
        let edit = GroupEdit::Name(name.to_owned());
        Ok(vec![self.request(ApiCall::EditGroup { chat_id, edit })])
    }

    /// Change the joined group's picture.
    ///
    /// # Errors
    ///
    /// - Any error from the group admin check
    pub fn change_group_picture(
        &mut self,
        store: &ConversationStore,
        url: &str,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let chat_id = self.admin_conversation(store)?.id;
        let edit = GroupEdit::PictureUrl(url.to_owned());
        Ok(vec![self.request(ApiCall::EditGroup { chat_id, edit })])
    }

    /// Make a group member an admin.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnknownParticipant` if not in the roster
    /// - Any error from the group admin check
    pub fn promote_participant(
        &mut self,
        store: &ConversationStore,
        participant_id: ParticipantId,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let chat_id = self.member_of_admin_conversation(store, participant_id)?;
        Ok(vec![self.request(ApiCall::Promote { chat_id, participant_id })])
    }

    /// Remove a member from the group.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnknownParticipant` if not in the roster
    /// - Any error from the group admin check
    pub fn remove_participant(
        &mut self,
        store: &ConversationStore,
        participant_id: ParticipantId,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let chat_id = self.member_of_admin_conversation(store, participant_id)?;
        Ok(vec![self.request(ApiCall::Remove { chat_id, participant_id })])
    }

    /// Process an event and return resulting actions.
    pub fn handle(
        &mut self,
        store: &mut ConversationStore,
        event: SessionEvent,
    ) -> Vec<SessionAction> {
        match event {
            SessionEvent::Connected => {
                self.link = Link::Up;
                self.tracker.on_connected().into_iter().map(SessionAction::Emit).collect()
            },
            SessionEvent::Disconnected { reason } => {
                tracing::warn!(%reason, "transport disconnected");
                if self.link == Link::Up {
                    self.link = Link::Connecting;
                }
                self.tracker.on_disconnected();
                vec![]
            },
            SessionEvent::Unavailable { reason } => {
                tracing::error!(%reason, "chat unavailable");
                self.link = Link::Down;
                self.tracker.on_disconnected();
                vec![SessionAction::Unavailable { reason }]
            },
            SessionEvent::Server(event) => {
                self.handle_server(store, &event);
                vec![]
            },
            SessionEvent::Response { id, result } => self.handle_response(store, id, result),
        }
    }

    fn handle_server(&mut self, store: &mut ConversationStore, event: &ServerEvent) {
        match event {
            ServerEvent::ChatParticipantJoined => self.tracker.on_joined(),
            ServerEvent::NewMessage(payload) => {
                let outcome = self.reconciler.record_inbound(store, InboundSource::Room, payload);
                tracing::trace!(chat_id = payload.chat_id, ?outcome, "new_message");
            },
            ServerEvent::UpdateChat(payload) => {
                let outcome = self.reconciler.record_inbound(store, InboundSource::ChatList, payload);
                tracing::trace!(chat_id = payload.chat_id, ?outcome, "update_chat");
            },
        }
    }

    fn handle_response(
        &mut self,
        store: &mut ConversationStore,
        id: RequestId,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<SessionAction> {
        let Some(pending) = self.requests.remove(&id) else {
            tracing::debug!(request = id, "response to unknown or cancelled request");
            return vec![];
        };
        if pending.generation != self.generation {
            tracing::debug!(request = id, "stale response ignored");
            return vec![];
        }

        match (pending.call, result) {
            (ApiCall::Details { chat_id }, Ok(ApiResponse::Details(details))) => {
                store.upsert_details(details);
                self.complete_join(store, chat_id)
            },
            (ApiCall::Details { chat_id }, Err(err)) => {
                // Fall back to whatever the store already knows
                tracing::warn!(chat_id, %err, "details fetch failed");
                self.complete_join(store, chat_id)
            },
            (ApiCall::History { chat_id, page }, Ok(ApiResponse::History(messages))) => {
                let inserted = store.prepend_history(chat_id, &messages);
                self.history_page = self.history_page.max(page);
                tracing::debug!(chat_id, page, inserted, "history loaded");
                vec![]
            },
            (ApiCall::EditGroup { chat_id, edit }, Ok(ApiResponse::Done)) => {
                match edit {
                    GroupEdit::Name(name) => store.set_group_name(chat_id, &name),
                    GroupEdit::PictureUrl(url) => store.set_group_picture(chat_id, &url),
                }
                vec![]
            },
            (ApiCall::Promote { chat_id, participant_id }, Ok(ApiResponse::Done)) => {
                store.set_admin(chat_id, participant_id, true);
                vec![]
            },
            (ApiCall::Remove { chat_id, participant_id }, Ok(ApiResponse::Done)) => {
                store.remove_participant(chat_id, participant_id);
                vec![]
            },
            (call, Err(err)) => {
                tracing::warn!(?call, %err, "request failed");
                vec![SessionAction::Error { message: format!("{} failed: {err}", describe(&call)) }]
            },
            (call, Ok(response)) => {
                tracing::warn!(?call, ?response, "mismatched response");
                vec![]
            },
        }
    }

    fn complete_join(&mut self, store: &ConversationStore, chat_id: ChatId) -> Vec<SessionAction> {
        if self.joining != Some(chat_id) {
            return vec![];
        }
        self.joining = None;

        let Some(participant_id) = store.get(chat_id).and_then(|c| c.self_participant_id) else {
            let err = SessionError::NotParticipant { chat_id };
            tracing::warn!(chat_id, "cannot join: {err}");
            return vec![SessionAction::Error { message: err.to_string() }];
        };

        self.tracker.join(chat_id, participant_id).into_iter().map(SessionAction::Emit).collect()
    }

    /// Leave the room, unfocus everything this session focused and cancel
    /// requests of the current generation.
    fn release(&mut self, store: &mut ConversationStore) -> Vec<SessionAction> {
        self.generation += 1;
        self.joining = None;
        self.requests.clear();
        for chat_id in std::mem::take(&mut self.focused) {
            store.set_focus(chat_id, false);
        }
        self.tracker.leave().into_iter().map(SessionAction::Emit).collect()
    }

    fn ensure_connecting(&mut self) -> Vec<SessionAction> {
        if self.link != Link::Down {
            return vec![];
        }
        self.link = Link::Connecting;
        self.started = true;
        vec![SessionAction::Connect {
            url: self.config.server_url.clone(),
            options: self.config.options.clone(),
        }]
    }

    fn request(&mut self, call: ApiCall) -> SessionAction {
        let id = self.next_request;
        self.next_request += 1;
        self.requests.insert(id, PendingRequest { generation: self.generation, call: call.clone() });
        SessionAction::Request(ApiRequest { id, call })
    }

    fn admin_conversation<'s>(
        &self,
        store: &'s ConversationStore,
    ) -> Result<&'s Conversation, SessionError> {
        let chat_id = self.tracker.active_conversation().ok_or(SessionError::NotJoined)?;
        let conv = store.get(chat_id).ok_or(SessionError::NotJoined)?;
        if !conv.is_group {
            return Err(SessionError::NotGroup { chat_id });
        }
        if conv.self_participant_id.is_none() {
            return Err(SessionError::NotParticipant { chat_id });
        }
        if !conv.is_self_admin() {
            return Err(SessionError::NotPermitted { chat_id });
        }
        Ok(conv)
    }

    fn member_of_admin_conversation(
        &self,
        store: &ConversationStore,
        participant_id: ParticipantId,
    ) -> Result<ChatId, SessionError> {
        let conv = self.admin_conversation(store)?;
        if conv.participant(participant_id).is_none() {
            return Err(SessionError::UnknownParticipant { chat_id: conv.id, participant_id });
        }
        Ok(conv.id)
    }
}

fn describe(call: &ApiCall) -> &'static str {
    match call {
        ApiCall::Details { .. } => "loading conversation",
        ApiCall::History { .. } => "loading history",
        ApiCall::EditGroup { .. } => "editing group",
        ApiCall::Promote { .. } => "promoting participant",
        ApiCall::Remove { .. } => "removing participant",
    }
}
