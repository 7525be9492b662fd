//! Standard invariant checks.

use std::collections::HashSet;

use lectern_client::{DeliveryState, MessagePreview};

use super::{Invariant, InvariantResult, StoreSnapshot, Violation};

/// The active room must be a known conversation.
pub struct ActiveRoomInStore;

impl Invariant for ActiveRoomInStore {
    fn name(&self) -> &'static str {
        "active_room_in_store"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        match state.active_room {
            Some(active) if state.conversation(active).is_none() => Err(Violation {
                invariant: self.name(),
                message: format!("active room {active} is not in the store"),
            }),
            _ => Ok(()),
        }
    }
}

/// The preview always describes the newest message (ties to the later
/// entry), and is absent only for an empty conversation.
pub struct PreviewMatchesMessages;

impl Invariant for PreviewMatchesMessages {
    fn name(&self) -> &'static str {
        "preview_matches_messages"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for conv in &state.conversations {
            let expected = conv.messages.iter().max_by_key(|m| m.timestamp).map(MessagePreview::from);
            if conv.last_message_preview != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "conversation {}: preview {:?}, newest message {:?}",
                        conv.id, conv.last_message_preview, expected
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A server message id appears at most once per conversation.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for conv in &state.conversations {
            let mut seen = HashSet::new();
            for id in conv.messages.iter().filter_map(|m| m.message_id) {
                if !seen.insert(id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("conversation {}: message {id} listed twice", conv.id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Rosters are unique by participant id.
pub struct UniqueParticipants;

impl Invariant for UniqueParticipants {
    fn name(&self) -> &'static str {
        "unique_participants"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for conv in &state.conversations {
            let mut seen = HashSet::new();
            for p in &conv.participants {
                if !seen.insert(p.participant_id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "conversation {}: participant {} listed twice",
                            conv.id, p.participant_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A focused conversation has nothing unread.
pub struct FocusedHasNoUnread;

impl Invariant for FocusedHasNoUnread {
    fn name(&self) -> &'static str {
        "focused_has_no_unread"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        match state.conversations.iter().find(|c| c.focused && c.unread_count > 0) {
            Some(conv) => Err(Violation {
                invariant: self.name(),
                message: format!("conversation {} is focused with {} unread", conv.id, conv.unread_count),
            }),
            None => Ok(()),
        }
    }
}

/// Only the local user's messages can be pending or failed, and they carry
/// no server id.
pub struct UnconfirmedAreOwn;

impl Invariant for UnconfirmedAreOwn {
    fn name(&self) -> &'static str {
        "unconfirmed_are_own"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for conv in &state.conversations {
            let bad = conv.messages.iter().find(|m| {
                m.delivery_state != DeliveryState::Sent
                    && (m.message_id.is_some()
                        || Some(m.sender_participant_id) != conv.self_participant_id)
            });
            if let Some(m) = bad {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "conversation {}: {:?} message {} from {} (self {:?}, id {:?})",
                        conv.id,
                        m.delivery_state,
                        m.local_id,
                        m.sender_participant_id,
                        conv.self_participant_id,
                        m.message_id
                    ),
                });
            }
        }
        Ok(())
    }
}
