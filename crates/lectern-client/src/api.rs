//! REST collaborator.
//!
//! The chat backend's REST API is consumed, not implemented, here. The
//! session requests calls as [`ApiRequest`] actions; the runtime runs them
//! through a [`ChatApi`] and feeds the [`ApiResponse`] back.

use async_trait::async_trait;
use lectern_proto::{ChatId, MessagePayload, ParticipantId};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    model::{ConversationDetails, NewGroup, UserSummary},
};

/// Correlates a response with the request that caused it.
pub type RequestId = u64;

/// Change to a group's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupEdit {
    /// New group name.
    Name(String),
    /// New group picture URL.
    PictureUrl(String),
}

/// Chat backend REST API.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Conversation metadata and roster.
    async fn conversation_details(&self, chat_id: ChatId)
    -> Result<ConversationDetails, ApiError>;

    /// One page of message history, oldest first. Page 1 is the newest page.
    async fn message_history(
        &self,
        chat_id: ChatId,
        page: u32,
    ) -> Result<Vec<MessagePayload>, ApiError>;

    /// Participant directory search.
    async fn search_participants(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<UserSummary>, ApiError>;

    /// Create a group chat.
    async fn create_group(&self, group: &NewGroup) -> Result<ConversationDetails, ApiError>;

    /// Change a group's name or picture.
    async fn edit_group(&self, chat_id: ChatId, edit: &GroupEdit) -> Result<(), ApiError>;

    /// Make a participant a group admin.
    async fn promote_participant(
        &self,
        chat_id: ChatId,
        participant_id: ParticipantId,
    ) -> Result<(), ApiError>;

    /// Remove a participant from a group.
    async fn remove_participant(
        &self,
        chat_id: ChatId,
        participant_id: ParticipantId,
    ) -> Result<(), ApiError>;
}

/// REST call requested by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// Fetch details.
    Details {
        /// Conversation.
        chat_id: ChatId,
    },
    /// Fetch a history page.
    History {
        /// Conversation.
        chat_id: ChatId,
        /// Page number, from 1.
        page: u32,
    },
    /// Edit group metadata.
    EditGroup {
        /// Conversation.
        chat_id: ChatId,
        /// Change to apply.
        edit: GroupEdit,
    },
    /// Promote to admin.
    Promote {
        /// Conversation.
        chat_id: ChatId,
        /// Participant to promote.
        participant_id: ParticipantId,
    },
    /// Remove from the group.
    Remove {
        /// Conversation.
        chat_id: ChatId,
        /// Participant to remove.
        participant_id: ParticipantId,
    },
}

impl ApiCall {
    /// Conversation the call concerns.
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::Details { chat_id }
            | Self::History { chat_id, .. }
            | Self::EditGroup { chat_id, .. }
            | Self::Promote { chat_id, .. }
            | Self::Remove { chat_id, .. } => *chat_id,
        }
    }
}

/// Request action emitted by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Correlation id.
    pub id: RequestId,
    /// Call to make.
    pub call: ApiCall,
}

/// Successful response to an [`ApiCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// Details fetched.
    Details(ConversationDetails),
    /// History page fetched.
    History(Vec<MessagePayload>),
    /// Mutation accepted.
    Done,
}

/// Run one call against `api`.
pub async fn execute(api: &dyn ChatApi, call: &ApiCall) -> Result<ApiResponse, ApiError> {
    match call {
        ApiCall::Details { chat_id } => api.conversation_details(*chat_id).await.map(ApiResponse::Details),
        ApiCall::History { chat_id, page } => {
            api.message_history(*chat_id, *page).await.map(ApiResponse::History)
        },
        ApiCall::EditGroup { chat_id, edit } => {
            api.edit_group(*chat_id, edit).await.map(|()| ApiResponse::Done)
        },
        ApiCall::Promote { chat_id, participant_id } => {
            api.promote_participant(*chat_id, *participant_id).await.map(|()| ApiResponse::Done)
        },
        ApiCall::Remove { chat_id, participant_id } => {
            api.remove_participant(*chat_id, *participant_id).await.map(|()| ApiResponse::Done)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_edit_body_shape() {
        let name = serde_json::to_string(&GroupEdit::Name("Exam prep".into())).expect("json");
        let picture =
            serde_json::to_string(&GroupEdit::PictureUrl("https://img/1.png".into())).expect("json");

        insta::assert_snapshot!(name, @r#"{"name":"Exam prep"}"#);
        insta::assert_snapshot!(picture, @r#"{"picture_url":"https://img/1.png"}"#);
    }

    #[test]
    fn call_reports_its_conversation() {
        assert_eq!(ApiCall::History { chat_id: 4, page: 2 }.chat_id(), 4);
        assert_eq!(ApiCall::Remove { chat_id: 5, participant_id: 9 }.chat_id(), 5);
    }
}
