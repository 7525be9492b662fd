//! Conversation data model.
//!
//! Plain data: all mutation goes through [`crate::ConversationStore`] so that
//! subscribers observe every change and derived fields stay consistent.

use chrono::{DateTime, Utc};
use lectern_proto::{ChatId, MessageId, MessagePayload, ParticipantId};
use serde::{Deserialize, Serialize};

/// Client-generated message identity, unique per store.
pub type LocalId = u64;

/// Conversation member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Identifier within the conversation roster.
    pub participant_id: ParticipantId,
    /// Account email, used to recognise the local user.
    pub email: String,
    /// Name shown in the UI.
    pub display_name: String,
    /// Avatar. The UI falls back to a default picture when absent.
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    /// Group administrator. Meaningless for private chats.
    #[serde(default)]
    pub is_admin: bool,
}

impl Participant {
    /// True if `email` identifies this participant (case-insensitive, trimmed).
    pub fn has_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

/// Client-local delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Emitted, waiting for the server echo.
    Pending,
    /// Acknowledged by the server, or received from it.
    Sent,
    /// Never reached the server.
    Failed,
}

/// One entry in a conversation's message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Provisional identity assigned on insertion.
    pub local_id: LocalId,
    /// Server id. `None` until the echo arrives.
    pub message_id: Option<MessageId>,
    /// Author.
    pub sender_participant_id: ParticipantId,
    /// Text.
    pub content: String,
    /// Local clock while pending; server-authoritative afterwards.
    pub timestamp: DateTime<Utc>,
    /// Delivery status.
    pub delivery_state: DeliveryState,
}

impl Message {
    /// Message received from the server.
    pub fn received(local_id: LocalId, payload: &MessagePayload) -> Self {
        Self {
            local_id,
            message_id: Some(payload.message_id),
            sender_participant_id: payload.sender_id,
            content: payload.content.clone(),
            timestamp: payload.timestamp,
            delivery_state: DeliveryState::Sent,
        }
    }

    /// True while waiting for the server echo.
    pub fn is_pending(&self) -> bool {
        self.delivery_state == DeliveryState::Pending
    }
}

/// Summary of the most recent message, shown in chat lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    /// Text of the message.
    pub content: String,
    /// Author.
    pub sender_participant_id: ParticipantId,
    /// Timestamp of the message.
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for MessagePreview {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            sender_participant_id: message.sender_participant_id,
            timestamp: message.timestamp,
        }
    }
}

/// A private or group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    /// Server-assigned id.
    pub id: ChatId,
    /// Group chat rather than a private one.
    pub is_group: bool,
    /// Group name, or the other participant's name in a private chat.
    pub display_name: String,
    /// Group picture, or the other participant's avatar in a private chat.
    pub picture_url: Option<String>,
    /// Roster, unique by participant id.
    pub participants: Vec<Participant>,
    /// Display order. History before live messages; never shrinks.
    pub messages: Vec<Message>,
    /// Messages from others received while not focused.
    pub unread_count: u32,
    /// Derived from `messages` on every change.
    pub last_message_preview: Option<MessagePreview>,
    /// Local user's participant id, once a roster containing them is known.
    pub self_participant_id: Option<ParticipantId>,
    /// A mounted view currently shows this conversation.
    pub focused: bool,
}

impl Conversation {
    /// Empty conversation known only by id.
    pub fn stub(id: ChatId) -> Self {
        Self {
            id,
            is_group: false,
            display_name: String::new(),
            picture_url: None,
            participants: Vec::new(),
            messages: Vec::new(),
            unread_count: 0,
            last_message_preview: None,
            self_participant_id: None,
            focused: false,
        }
    }

    /// Look up a roster entry.
    pub fn participant(&self, participant_id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.participant_id == participant_id)
    }

    /// The local user's roster entry.
    pub fn self_participant(&self) -> Option<&Participant> {
        self.self_participant_id.and_then(|id| self.participant(id))
    }

    /// True if the local user administers this group.
    pub fn is_self_admin(&self) -> bool {
        self.is_group && self.self_participant().is_some_and(|p| p.is_admin)
    }

    /// True if a message with this server id is already listed.
    pub fn contains_message(&self, message_id: MessageId) -> bool {
        self.messages.iter().any(|m| m.message_id == Some(message_id))
    }

    /// Recompute the preview: greatest timestamp, ties to the later entry.
    pub(crate) fn refresh_preview(&mut self) {
        self.last_message_preview =
            self.messages.iter().max_by_key(|m| m.timestamp).map(MessagePreview::from);
    }

    /// Derive name and picture of a private chat from the other participant.
    pub(crate) fn derive_private_metadata(&mut self) {
        if self.is_group {
            return;
        }
        let other = self
            .participants
            .iter()
            .find(|p| Some(p.participant_id) != self.self_participant_id);
        if let Some(other) = other {
            self.display_name = other.display_name.clone();
            self.picture_url = other.profile_picture_url.clone();
        }
    }
}

/// Conversation details returned by the REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDetails {
    /// Conversation id.
    pub id: ChatId,
    /// Group chat rather than a private one.
    #[serde(default)]
    pub is_group: bool,
    /// Group name. Absent for private chats.
    #[serde(default)]
    pub name: Option<String>,
    /// Group picture. Absent for private chats.
    #[serde(default)]
    pub picture_url: Option<String>,
    /// Roster.
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// Directory entry returned by participant search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// Account id.
    pub user_id: u64,
    /// Account email.
    pub email: String,
    /// Name shown in the UI.
    pub display_name: String,
    /// Avatar.
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Request body for group creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    /// Group name.
    pub name: String,
    /// Account ids of the initial members, excluding the creator.
    pub participant_ids: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: ParticipantId, email: &str, name: &str) -> Participant {
        Participant {
            participant_id: id,
            email: email.into(),
            display_name: name.into(),
            profile_picture_url: None,
            is_admin: false,
        }
    }

    fn message(local_id: LocalId, secs: i64) -> Message {
        Message {
            local_id,
            message_id: Some(local_id),
            sender_participant_id: 1,
            content: format!("m{local_id}"),
            timestamp: DateTime::from_timestamp(secs, 0).expect("timestamp"),
            delivery_state: DeliveryState::Sent,
        }
    }

    #[test]
    fn email_match_ignores_case_and_whitespace() {
        let p = participant(7, "Ana@Example.com ", "Ana");
        assert!(p.has_email("ana@example.com"));
        assert!(!p.has_email("bob@example.com"));
    }

    #[test]
    fn preview_prefers_greatest_timestamp_then_later_position() {
        let mut conv = Conversation::stub(1);
        conv.messages = vec![message(1, 300), message(2, 100), message(3, 300)];
        conv.refresh_preview();

        assert_eq!(conv.last_message_preview.map(|p| p.content), Some("m3".into()));
    }

    #[test]
    fn private_chat_takes_other_participant_metadata() {
        let mut conv = Conversation::stub(1);
        conv.participants = vec![participant(7, "me@x", "Me"), participant(9, "you@x", "You")];
        conv.self_participant_id = Some(7);
        conv.derive_private_metadata();

        assert_eq!(conv.display_name, "You");
    }

    #[test]
    fn delivery_state_serializes_lowercase() {
        let json = serde_json::to_string(&DeliveryState::Pending).expect("serialize");
        assert_eq!(json, r#""pending""#);
    }
}
