//! Scripted REST collaborator.
//!
//! [`StaticApi`] answers from tables the test fills in and records every
//! call. Clones share the tables and the log, so a test keeps one clone
//! while the runtime owns the other.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use lectern_client::{
    ApiError, ChatApi, ConversationDetails, GroupEdit, NewGroup, Participant, UserSummary,
};
use lectern_proto::{ChatId, MessagePayload, ParticipantId};

/// First id handed out by [`ChatApi::create_group`].
pub const FIRST_CREATED_CHAT: ChatId = 1000;

/// A call received by [`StaticApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    /// `conversation_details`
    Details(ChatId),
    /// `message_history`
    History(ChatId, u32),
    /// `search_participants`
    Search(String, u32, u32),
    /// `create_group`
    CreateGroup(NewGroup),
    /// `edit_group`
    EditGroup(ChatId, GroupEdit),
    /// `promote_participant`
    Promote(ChatId, ParticipantId),
    /// `remove_participant`
    Remove(ChatId, ParticipantId),
}

#[derive(Debug, Default)]
struct Tables {
    details: HashMap<ChatId, ConversationDetails>,
    history: HashMap<(ChatId, u32), Vec<MessagePayload>>,
    details_errors: HashMap<ChatId, ApiError>,
    mutation_error: Option<ApiError>,
    users: Vec<UserSummary>,
    creator: Option<Participant>,
    next_chat: ChatId,
    calls: Vec<RecordedCall>,
}

/// [`ChatApi`] backed by in-memory tables.
#[derive(Debug, Clone)]
pub struct StaticApi {
    tables: Arc<Mutex<Tables>>,
}

impl Default for StaticApi {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticApi {
    /// Empty API. Unknown conversations answer 404.
    pub fn new() -> Self {
        let tables = Tables { next_chat: FIRST_CREATED_CHAT, ..Tables::default() };
        Self { tables: Arc::new(Mutex::new(tables)) }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `details` for its conversation.
    pub fn with_details(self, details: ConversationDetails) -> Self {
        self.lock().details.insert(details.id, details);
        self
    }

    /// Serve `messages` as history page `page` of `chat_id`.
    pub fn with_history(self, chat_id: ChatId, page: u32, messages: Vec<MessagePayload>) -> Self {
        self.lock().history.insert((chat_id, page), messages);
        self
    }

    /// Directory used by participant search.
    pub fn with_users(self, users: Vec<UserSummary>) -> Self {
        self.lock().users = users;
        self
    }

    /// Roster entry for the local user in created groups.
    pub fn with_creator(self, creator: Participant) -> Self {
        self.lock().creator = Some(creator);
        self
    }

    /// Fail details fetches for `chat_id`.
    pub fn fail_details(&self, chat_id: ChatId, error: ApiError) {
        self.lock().details_errors.insert(chat_id, error);
    }

    /// Fail every group edit, promotion and removal, or stop failing them.
    pub fn fail_mutations(&self, error: Option<ApiError>) {
        self.lock().mutation_error = error;
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    fn mutation(&self, call: RecordedCall) -> Result<(), ApiError> {
        let mut tables = self.lock();
        tables.calls.push(call);
        tables.mutation_error.clone().map_or(Ok(()), Err)
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status { status: 404, message: format!("{what} not found") }
}

#[async_trait]
impl ChatApi for StaticApi {
    async fn conversation_details(&self, chat_id: ChatId) -> Result<ConversationDetails, ApiError> {
        let mut tables = self.lock();
        tables.calls.push(RecordedCall::Details(chat_id));
        if let Some(err) = tables.details_errors.get(&chat_id) {
            return Err(err.clone());
        }
        tables.details.get(&chat_id).cloned().ok_or_else(|| not_found("conversation"))
    }

    async fn message_history(
        &self,
        chat_id: ChatId,
        page: u32,
    ) -> Result<Vec<MessagePayload>, ApiError> {
        let mut tables = self.lock();
        tables.calls.push(RecordedCall::History(chat_id, page));
        Ok(tables.history.get(&(chat_id, page)).cloned().unwrap_or_default())
    }

    async fn search_participants(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<UserSummary>, ApiError> {
        let mut tables = self.lock();
        tables.calls.push(RecordedCall::Search(query.to_owned(), page, limit));

        let needle = query.trim().to_lowercase();
        let skip = page.saturating_sub(1) as usize * limit as usize;
        Ok(tables
            .users
            .iter()
            .filter(|u| {
                u.display_name.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            })
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create_group(&self, group: &NewGroup) -> Result<ConversationDetails, ApiError> {
        let mut tables = self.lock();
        tables.calls.push(RecordedCall::CreateGroup(group.clone()));

        let id = tables.next_chat;
        tables.next_chat += 1;

        let mut participants: Vec<Participant> = tables.creator.iter().cloned().collect();
        let first_member = participants.len() as ParticipantId + 1;
        participants.extend(
            tables
                .users
                .iter()
                .filter(|u| group.participant_ids.contains(&u.user_id))
                .zip(first_member..)
                .map(|(user, participant_id)| Participant {
                    participant_id,
                    email: user.email.clone(),
                    display_name: user.display_name.clone(),
                    profile_picture_url: user.profile_picture_url.clone(),
                    is_admin: false,
                }),
        );

        let details = ConversationDetails {
            id,
            is_group: true,
            name: Some(group.name.clone()),
            picture_url: None,
            participants,
        };
        tables.details.insert(id, details.clone());
        Ok(details)
    }

    async fn edit_group(&self, chat_id: ChatId, edit: &GroupEdit) -> Result<(), ApiError> {
        self.mutation(RecordedCall::EditGroup(chat_id, edit.clone()))
    }

    async fn promote_participant(
        &self,
        chat_id: ChatId,
        participant_id: ParticipantId,
    ) -> Result<(), ApiError> {
        self.mutation(RecordedCall::Promote(chat_id, participant_id))
    }

    async fn remove_participant(
        &self,
        chat_id: ChatId,
        participant_id: ParticipantId,
    ) -> Result<(), ApiError> {
        self.mutation(RecordedCall::Remove(chat_id, participant_id))
    }
}
