//! Message reconciler.
//!
//! Merges outbound sends and inbound broadcasts into each conversation's
//! message list:
//!
//! - Outbound sends are written to the store optimistically as `pending`
//!   (or `failed` when the link is down) before anything is emitted.
//! - A server echo of our own message acknowledges the oldest pending
//!   message from us in that conversation instead of adding a second copy.
//!   Echoes carry no correlation id, so matching is first-in first-out.
//! - Broadcasts whose server id is already listed are dropped, which covers
//!   the same message arriving through both the room and the chat-list feed.
//! - Messages from others bump the unread counter while unfocused.
//!
//! Messages are kept in receipt order; timestamps never reorder the list.

use lectern_core::Environment;
use lectern_proto::{ChatId, ClientEvent, MessagePayload, ParticipantId, SendMessage};

use crate::{
    error::SessionError,
    model::{DeliveryState, LocalId, Message},
    store::ConversationStore,
};

/// Feed an inbound message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundSource {
    /// `new_message` in the joined room.
    Room,
    /// `update_chat` for chat lists.
    ChatList,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Added to the list.
    Appended {
        /// The unread counter was incremented.
        unread: bool,
    },
    /// Acknowledged one of our pending sends.
    EchoReconciled {
        /// Local id of the acknowledged message.
        local_id: LocalId,
    },
    /// Our own echo with nothing pending to acknowledge.
    EchoDiscarded,
    /// Server id already listed.
    Duplicate,
}

/// Outcome of recording an outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Local id of the optimistic entry.
    pub local_id: LocalId,
    /// Event to emit. `None` if the link is down and the entry was marked
    /// failed.
    pub event: Option<ClientEvent>,
}

/// Reconciles sends and broadcasts against the conversation store.
#[derive(Debug, Clone)]
pub struct MessageReconciler<E: Environment> {
    env: E,
}

impl<E: Environment> MessageReconciler<E> {
    /// Reconciler stamping optimistic messages with `env`'s wall clock.
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Record a message we are about to send.
    ///
    /// # Errors
    ///
    /// - `SessionError::EmptyMessage` for blank content; nothing is written
    ///   and nothing is emitted
    pub fn record_outbound(
        &self,
        store: &mut ConversationStore,
        chat_id: ChatId,
        content: &str,
        self_participant_id: ParticipantId,
        connected: bool,
    ) -> Result<Outbound, SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let local_id = store.next_local_id();
        let delivery_state = if connected { DeliveryState::Pending } else { DeliveryState::Failed };
        store.append_message(chat_id, Message {
            local_id,
            message_id: None,
            sender_participant_id: self_participant_id,
            content: content.to_owned(),
            timestamp: self.env.wall_clock(),
            delivery_state,
        });

        if !connected {
            tracing::warn!(chat_id, local_id, "send while disconnected, marked failed");
            return Ok(Outbound { local_id, event: None });
        }

        let event = ClientEvent::SendMessage(SendMessage {
            chat_id,
            chat_participant_id: self_participant_id,
            content: content.to_owned(),
        });
        Ok(Outbound { local_id, event: Some(event) })
    }

    /// Merge a broadcast into the store.
    pub fn record_inbound(
        &self,
        store: &mut ConversationStore,
        source: InboundSource,
        payload: &MessagePayload,
    ) -> InboundOutcome {
        let chat_id = payload.chat_id;
        let (duplicate, self_id) = store
            .get(chat_id)
            .map_or((false, None), |c| (c.contains_message(payload.message_id), c.self_participant_id));

        if duplicate {
            tracing::trace!(chat_id, message_id = payload.message_id, "duplicate broadcast");
            return InboundOutcome::Duplicate;
        }

        if self_id == Some(payload.sender_id) {
            if let Some(local_id) = store.acknowledge_pending(
                chat_id,
                payload.sender_id,
                payload.message_id,
                payload.timestamp,
            ) {
                tracing::debug!(chat_id, local_id, message_id = payload.message_id, "echo reconciled");
                return InboundOutcome::EchoReconciled { local_id };
            }

            if source == InboundSource::Room {
                tracing::debug!(chat_id, message_id = payload.message_id, "echo without pending send");
                return InboundOutcome::EchoDiscarded;
            }

            // Sent from another screen or device
            let local_id = store.next_local_id();
            store.append_message(chat_id, Message::received(local_id, payload));
            return InboundOutcome::Appended { unread: false };
        }

        let local_id = store.next_local_id();
        let unread = store.mutate(chat_id, |conv| {
            conv.messages.push(Message::received(local_id, payload));
            if conv.focused {
                false
            } else {
                conv.unread_count = conv.unread_count.saturating_add(1);
                true
            }
        });
        InboundOutcome::Appended { unread }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::model::{ConversationDetails, Participant};

    #[derive(Debug, Clone)]
    struct FixedClock;

    impl Environment for FixedClock {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn wall_clock(&self) -> DateTime<Utc> {
            "2025-01-04T09:59:59Z".parse().unwrap_or_default()
        }

        async fn sleep(&self, _duration: Duration) {}

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }
    }

    fn store_with_chat(chat_id: ChatId) -> ConversationStore {
        let mut store = ConversationStore::new("me@x");
        store.upsert_details(ConversationDetails {
            id: chat_id,
            is_group: false,
            name: None,
            picture_url: None,
            participants: vec![
                Participant {
                    participant_id: 7,
                    email: "me@x".into(),
                    display_name: "Me".into(),
                    profile_picture_url: None,
                    is_admin: false,
                },
                Participant {
                    participant_id: 9,
                    email: "ana@x".into(),
                    display_name: "Ana".into(),
                    profile_picture_url: None,
                    is_admin: false,
                },
            ],
        });
        store
    }

    fn broadcast(chat_id: ChatId, message_id: u64, sender_id: ParticipantId, content: &str) -> MessagePayload {
        MessagePayload {
            chat_id,
            message_id,
            sender_id,
            content: content.into(),
            timestamp: "2025-01-04T10:00:00Z".parse().expect("timestamp"),
        }
    }

    #[test]
    fn outbound_is_pending_and_emitted() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);

        let out = reconciler.record_outbound(&mut store, 42, "hello", 7, true).expect("send");

        assert!(matches!(out.event, Some(ClientEvent::SendMessage(ref s)) if s.content == "hello"));
        let conv = store.get(42).expect("conv");
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.messages[0].is_pending());
    }

    #[test]
    fn blank_outbound_writes_nothing() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);

        for blank in ["", "   ", "\n\t"] {
            assert_eq!(
                reconciler.record_outbound(&mut store, 42, blank, 7, true),
                Err(SessionError::EmptyMessage)
            );
        }
        assert!(store.get(42).expect("conv").messages.is_empty());
    }

    #[test]
    fn outbound_while_disconnected_is_failed_and_silent() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);

        let out = reconciler.record_outbound(&mut store, 42, "hello", 7, false).expect("send");

        assert_eq!(out.event, None);
        assert_eq!(store.get(42).expect("conv").messages[0].delivery_state, DeliveryState::Failed);
    }

    #[test]
    fn echo_reconciles_without_duplicating() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);
        let out = reconciler.record_outbound(&mut store, 42, "hello", 7, true).expect("send");

        let outcome =
            reconciler.record_inbound(&mut store, InboundSource::Room, &broadcast(42, 501, 7, "hello"));

        assert_eq!(outcome, InboundOutcome::EchoReconciled { local_id: out.local_id });
        let conv = store.get(42).expect("conv");
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].message_id, Some(501));
        assert_eq!(conv.messages[0].delivery_state, DeliveryState::Sent);
        assert_eq!(conv.unread_count, 0);
    }

    #[test]
    fn echo_without_pending_is_discarded_in_room() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);

        let outcome =
            reconciler.record_inbound(&mut store, InboundSource::Room, &broadcast(42, 501, 7, "x"));

        assert_eq!(outcome, InboundOutcome::EchoDiscarded);
        assert!(store.get(42).expect("conv").messages.is_empty());
    }

    #[test]
    fn own_message_from_elsewhere_appears_in_chat_list_without_unread() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);

        let outcome = reconciler.record_inbound(
            &mut store,
            InboundSource::ChatList,
            &broadcast(42, 501, 7, "from my laptop"),
        );

        assert_eq!(outcome, InboundOutcome::Appended { unread: false });
        assert_eq!(store.get(42).expect("conv").unread_count, 0);
    }

    #[test]
    fn same_message_on_both_feeds_counts_once() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);
        let message = broadcast(42, 600, 9, "hi");

        let first = reconciler.record_inbound(&mut store, InboundSource::Room, &message);
        let second = reconciler.record_inbound(&mut store, InboundSource::ChatList, &message);

        assert_eq!(first, InboundOutcome::Appended { unread: true });
        assert_eq!(second, InboundOutcome::Duplicate);
        assert_eq!(store.get(42).expect("conv").unread_count, 1);
    }

    #[test]
    fn focused_conversation_does_not_count_unread() {
        let mut store = store_with_chat(42);
        store.set_focus(42, true);
        let reconciler = MessageReconciler::new(FixedClock);

        let outcome =
            reconciler.record_inbound(&mut store, InboundSource::Room, &broadcast(42, 1, 9, "hi"));

        assert_eq!(outcome, InboundOutcome::Appended { unread: false });
        assert_eq!(store.get(42).expect("conv").unread_count, 0);
    }

    #[test]
    fn unknown_conversation_is_created_as_stub() {
        let mut store = ConversationStore::new("me@x");
        let reconciler = MessageReconciler::new(FixedClock);

        let _ = reconciler.record_inbound(&mut store, InboundSource::ChatList, &broadcast(5, 1, 9, "hey"));

        let conv = store.get(5).expect("stub");
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.last_message_preview.as_ref().map(|p| p.content.as_str()), Some("hey"));
    }

    #[test]
    fn rapid_sends_reconcile_first_in_first_out() {
        let mut store = store_with_chat(42);
        let reconciler = MessageReconciler::new(FixedClock);
        let first = reconciler.record_outbound(&mut store, 42, "one", 7, true).expect("send");
        let second = reconciler.record_outbound(&mut store, 42, "two", 7, true).expect("send");

        assert_eq!(
            reconciler.record_inbound(&mut store, InboundSource::Room, &broadcast(42, 1, 7, "one")),
            InboundOutcome::EchoReconciled { local_id: first.local_id }
        );
        assert_eq!(
            reconciler.record_inbound(&mut store, InboundSource::Room, &broadcast(42, 2, 7, "two")),
            InboundOutcome::EchoReconciled { local_id: second.local_id }
        );
        assert_eq!(store.get(42).expect("conv").messages.len(), 2);
    }
}
