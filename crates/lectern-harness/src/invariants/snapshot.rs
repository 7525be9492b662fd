//! Observable state snapshots for invariant checking.
//!
//! Invariants run against a copy of the store taken between transitions, so
//! a check never sees a half-applied mutation.

use lectern_client::{Conversation, ConversationStore};
use lectern_proto::ChatId;

/// Snapshot of one client: its store and the room its session targets.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Every known conversation, in chat list order.
    pub conversations: Vec<Conversation>,
    /// Conversation the session has joined, if any.
    pub active_room: Option<ChatId>,
}

impl StoreSnapshot {
    /// Snapshot with no conversations.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Copy the observable state of `store`.
    pub fn capture(store: &ConversationStore, active_room: Option<ChatId>) -> Self {
        Self { conversations: store.chat_list().into_iter().cloned().collect(), active_room }
    }

    /// Look up a conversation.
    pub fn conversation(&self, chat_id: ChatId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == chat_id)
    }
}
