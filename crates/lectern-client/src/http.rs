//! HTTP implementation of the REST collaborator.

use async_trait::async_trait;
use lectern_proto::{ChatId, MessagePayload, ParticipantId};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::{
    api::{ChatApi, GroupEdit},
    error::ApiError,
    model::{ConversationDetails, NewGroup, UserSummary},
};

/// [`ChatApi`] over HTTP with JSON bodies and bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    /// Client for the API at `base_url`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client: Client::new(), base_url, token }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn checked(builder: RequestBuilder) -> Result<Response, ApiError> {
    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
    Err(ApiError::Status { status: status.as_u16(), message })
}

async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
    checked(builder).await?.json::<T>().await.map_err(transport_error)
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn conversation_details(&self, chat_id: ChatId) -> Result<ConversationDetails, ApiError> {
        json(self.request(Method::GET, &format!("/chats/{chat_id}"))).await
    }

    async fn message_history(
        &self,
        chat_id: ChatId,
        page: u32,
    ) -> Result<Vec<MessagePayload>, ApiError> {
        let builder = self
            .request(Method::GET, &format!("/chats/{chat_id}/messages"))
            .query(&[("page", page)]);
        json(builder).await
    }

    async fn search_participants(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<UserSummary>, ApiError> {
        let builder = self.request(Method::GET, "/users/search").query(&[
            ("query", query.to_owned()),
            ("page", page.to_string()),
            ("limit", limit.to_string()),
        ]);
        json(builder).await
    }

    async fn create_group(&self, group: &NewGroup) -> Result<ConversationDetails, ApiError> {
        json(self.request(Method::POST, "/chats").json(group)).await
    }

    async fn edit_group(&self, chat_id: ChatId, edit: &GroupEdit) -> Result<(), ApiError> {
        checked(self.request(Method::PATCH, &format!("/chats/{chat_id}")).json(edit)).await?;
        Ok(())
    }

    async fn promote_participant(
        &self,
        chat_id: ChatId,
        participant_id: ParticipantId,
    ) -> Result<(), ApiError> {
        let path = format!("/chats/{chat_id}/participants/{participant_id}/admin");
        checked(self.request(Method::POST, &path)).await?;
        Ok(())
    }

    async fn remove_participant(
        &self,
        chat_id: ChatId,
        participant_id: ParticipantId,
    ) -> Result<(), ApiError> {
        let path = format!("/chats/{chat_id}/participants/{participant_id}");
        checked(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }
}
