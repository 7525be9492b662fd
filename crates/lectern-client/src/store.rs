//! Conversation store.
//!
//! Addressable state container keyed by conversation id. Every mutation
//! recomputes derived fields and then synchronously notifies the subscribers
//! of that conversation, so views never observe a half-applied change.
//!
//! The store is the only state shared between views. Sessions reach it
//! through [`SharedStore`] and hold the lock for one transition at a time.

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use lectern_proto::{ChatId, MessageId, MessagePayload, ParticipantId};

use crate::model::{Conversation, ConversationDetails, LocalId, Message, Participant};

/// Store shared between the views of one app instance.
pub type SharedStore = Arc<tokio::sync::Mutex<ConversationStore>>;

/// Handle returned by [`ConversationStore::subscribe`].
pub type SubscriptionId = u64;

type Callback = Box<dyn FnMut(&Conversation) + Send>;

struct Subscriber {
    id: SubscriptionId,
    chat_id: ChatId,
    callback: Callback,
}

/// In-memory conversation state for one local user.
pub struct ConversationStore {
    self_email: String,
    conversations: BTreeMap<ChatId, Conversation>,
    subscribers: Vec<Subscriber>,
    next_subscription: SubscriptionId,
    next_local_id: LocalId,
}

impl ConversationStore {
    /// Create an empty store for the user with this email.
    pub fn new(self_email: impl Into<String>) -> Self {
        Self {
            self_email: self_email.into(),
            conversations: BTreeMap::new(),
            subscribers: Vec::new(),
            next_subscription: 1,
            next_local_id: 1,
        }
    }

    /// Wrap in the shared handle used by runtimes.
    pub fn shared(self) -> SharedStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Email identifying the local user in rosters.
    pub fn self_email(&self) -> &str {
        &self.self_email
    }

    /// Snapshot of a conversation. `None` if unknown.
    pub fn get(&self, chat_id: ChatId) -> Option<&Conversation> {
        self.conversations.get(&chat_id)
    }

    /// Number of known conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// True if no conversation is known.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// All conversations, newest preview first. Conversations without
    /// messages come last, ordered by id.
    pub fn chat_list(&self) -> Vec<&Conversation> {
        let mut list: Vec<&Conversation> = self.conversations.values().collect();
        list.sort_by(|a, b| {
            let a_at = a.last_message_preview.as_ref().map(|p| p.timestamp);
            let b_at = b.last_message_preview.as_ref().map(|p| p.timestamp);
            match (a_at, b_at) {
                (Some(a_at), Some(b_at)) => b_at.cmp(&a_at).then(a.id.cmp(&b.id)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.id.cmp(&b.id),
            }
        });
        list
    }

    /// Sum of unread counters, for the chat tab badge.
    pub fn total_unread(&self) -> u64 {
        self.conversations.values().map(|c| u64::from(c.unread_count)).sum()
    }

    /// Allocate a provisional message identity.
    pub fn next_local_id(&mut self) -> LocalId {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }

    /// Apply a details fetch: metadata, roster and self resolution.
    pub fn upsert_details(&mut self, details: ConversationDetails) {
        let self_email = self.self_email.clone();
        self.mutate(details.id, |conv| {
            conv.is_group = details.is_group;
            if details.is_group {
                conv.display_name = details.name.unwrap_or_default();
                conv.picture_url = details.picture_url;
            }
            replace_roster(conv, details.participants, &self_email);
        });
    }

    /// Replace the roster. Duplicate ids keep their first occurrence.
    pub fn upsert_participants(&mut self, chat_id: ChatId, participants: Vec<Participant>) {
        let self_email = self.self_email.clone();
        self.mutate(chat_id, |conv| replace_roster(conv, participants, &self_email));
    }

    /// Append at the end of the display order.
    pub fn append_message(&mut self, chat_id: ChatId, message: Message) {
        self.mutate(chat_id, |conv| conv.messages.push(message));
    }

    /// Insert an older history page before the current messages.
    ///
    /// Entries whose server id is already listed are skipped. Returns the
    /// number of messages inserted.
    pub fn prepend_history(&mut self, chat_id: ChatId, page: &[MessagePayload]) -> usize {
        let mut next_local = self.next_local_id;
        let inserted = self.mutate(chat_id, |conv| {
            let mut older: Vec<Message> = Vec::with_capacity(page.len());
            for payload in page {
                let seen = conv.contains_message(payload.message_id)
                    || older.iter().any(|m| m.message_id == Some(payload.message_id));
                if !seen {
                    older.push(Message::received(next_local, payload));
                    next_local += 1;
                }
            }
            let inserted = older.len();
            older.append(&mut conv.messages);
            conv.messages = older;
            inserted
        });
        self.next_local_id = next_local;
        inserted
    }

    /// Mark a conversation as shown (or hidden). Focusing resets unread.
    pub fn set_focus(&mut self, chat_id: ChatId, focused: bool) {
        self.mutate(chat_id, |conv| {
            conv.focused = focused;
            if focused {
                conv.unread_count = 0;
            }
        });
    }

    /// Count one unread message.
    pub fn increment_unread(&mut self, chat_id: ChatId) {
        self.mutate(chat_id, |conv| conv.unread_count = conv.unread_count.saturating_add(1));
    }

    /// Acknowledge the oldest pending message from `sender`.
    ///
    /// Adopts the server id and timestamp. Returns the local id of the
    /// reconciled message, or `None` (and no notification) if nothing was
    /// pending.
    pub fn acknowledge_pending(
        &mut self,
        chat_id: ChatId,
        sender: ParticipantId,
        message_id: MessageId,
        timestamp: DateTime<Utc>,
    ) -> Option<LocalId> {
        let has_pending = self.conversations.get(&chat_id).is_some_and(|conv| {
            conv.messages.iter().any(|m| m.is_pending() && m.sender_participant_id == sender)
        });
        if !has_pending {
            return None;
        }

        self.mutate(chat_id, |conv| {
            let pending = conv
                .messages
                .iter_mut()
                .find(|m| m.is_pending() && m.sender_participant_id == sender)?;
            pending.message_id = Some(message_id);
            pending.timestamp = timestamp;
            pending.delivery_state = crate::model::DeliveryState::Sent;
            Some(pending.local_id)
        })
    }

    /// Rename a group.
    pub fn set_group_name(&mut self, chat_id: ChatId, name: &str) {
        self.mutate(chat_id, |conv| conv.display_name = name.to_owned());
    }

    /// Change a group's picture.
    pub fn set_group_picture(&mut self, chat_id: ChatId, url: &str) {
        self.mutate(chat_id, |conv| conv.picture_url = Some(url.to_owned()));
    }

    /// Grant or revoke admin rights. Returns false if the participant is unknown.
    pub fn set_admin(&mut self, chat_id: ChatId, participant_id: ParticipantId, admin: bool) -> bool {
        if self.get(chat_id).and_then(|c| c.participant(participant_id)).is_none() {
            return false;
        }
        self.mutate(chat_id, |conv| {
            for p in conv.participants.iter_mut().filter(|p| p.participant_id == participant_id) {
                p.is_admin = admin;
            }
        });
        true
    }

    /// Drop a participant from the roster. Returns false if unknown.
    pub fn remove_participant(&mut self, chat_id: ChatId, participant_id: ParticipantId) -> bool {
        if self.get(chat_id).and_then(|c| c.participant(participant_id)).is_none() {
            return false;
        }
        self.mutate(chat_id, |conv| {
            conv.participants.retain(|p| p.participant_id != participant_id);
            if conv.self_participant_id == Some(participant_id) {
                conv.self_participant_id = None;
            }
        });
        true
    }

    /// Register a callback invoked after every mutation of `chat_id`.
    pub fn subscribe(
        &mut self,
        chat_id: ChatId,
        callback: impl FnMut(&Conversation) + Send + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push(Subscriber { id, chat_id, callback: Box::new(callback) });
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != subscription);
        self.subscribers.len() != before
    }

    /// Run one mutation, refresh derived fields, notify subscribers.
    ///
    /// Unknown conversations are created as stubs first.
    pub(crate) fn mutate<R>(&mut self, chat_id: ChatId, f: impl FnOnce(&mut Conversation) -> R) -> R {
        let conv = self.conversations.entry(chat_id).or_insert_with(|| Conversation::stub(chat_id));
        let result = f(conv);
        conv.refresh_preview();

        let conv: &Conversation = conv;
        for subscriber in self.subscribers.iter_mut().filter(|s| s.chat_id == chat_id) {
            (subscriber.callback)(conv);
        }
        result
    }
}

impl fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationStore")
            .field("conversations", &self.conversations.len())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

fn replace_roster(conv: &mut Conversation, participants: Vec<Participant>, self_email: &str) {
    let mut roster: Vec<Participant> = Vec::with_capacity(participants.len());
    for participant in participants {
        if !roster.iter().any(|p| p.participant_id == participant.participant_id) {
            roster.push(participant);
        }
    }

    conv.self_participant_id =
        roster.iter().find(|p| p.has_email(self_email)).map(|p| p.participant_id);
    conv.participants = roster;
    conv.derive_private_metadata();
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::model::DeliveryState;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).expect("timestamp")
    }

    fn participant(id: ParticipantId, email: &str) -> Participant {
        Participant {
            participant_id: id,
            email: email.into(),
            display_name: email.split('@').next().unwrap_or_default().into(),
            profile_picture_url: None,
            is_admin: false,
        }
    }

    fn payload(chat_id: ChatId, message_id: MessageId, secs: i64) -> MessagePayload {
        MessagePayload {
            chat_id,
            message_id,
            sender_id: 9,
            content: format!("m{message_id}"),
            timestamp: at(secs),
        }
    }

    fn pending(store: &mut ConversationStore, sender: ParticipantId, content: &str) -> Message {
        Message {
            local_id: store.next_local_id(),
            message_id: None,
            sender_participant_id: sender,
            content: content.into(),
            timestamp: at(50),
            delivery_state: DeliveryState::Pending,
        }
    }

    #[test]
    fn get_unknown_is_none() {
        let store = ConversationStore::new("me@x");
        assert!(store.get(42).is_none());
    }

    #[test]
    fn details_resolve_self_and_private_name() {
        let mut store = ConversationStore::new(" ME@x ");
        store.upsert_details(ConversationDetails {
            id: 42,
            is_group: false,
            name: None,
            picture_url: None,
            participants: vec![participant(7, "me@x"), participant(9, "ana@x")],
        });

        let conv = store.get(42).expect("conversation");
        assert_eq!(conv.self_participant_id, Some(7));
        assert_eq!(conv.display_name, "ana");
    }

    #[test]
    fn roster_keeps_first_of_duplicate_ids() {
        let mut store = ConversationStore::new("me@x");
        store.upsert_participants(1, vec![
            participant(7, "me@x"),
            participant(7, "impostor@x"),
            participant(9, "ana@x"),
        ]);

        let conv = store.get(1).expect("conversation");
        assert_eq!(conv.participants.len(), 2);
        assert_eq!(conv.participants[0].email, "me@x");
    }

    #[test]
    fn focus_resets_unread() {
        let mut store = ConversationStore::new("me@x");
        store.increment_unread(42);
        store.increment_unread(42);
        assert_eq!(store.get(42).map(|c| c.unread_count), Some(2));

        store.set_focus(42, true);
        assert_eq!(store.get(42).map(|c| c.unread_count), Some(0));
    }

    #[test]
    fn history_goes_before_live_and_skips_known_ids() {
        let mut store = ConversationStore::new("me@x");
        store.append_message(1, Message::received(100, &payload(1, 3, 30)));

        let inserted =
            store.prepend_history(1, &[payload(1, 1, 10), payload(1, 2, 20), payload(1, 3, 30)]);

        assert_eq!(inserted, 2);
        let ids: Vec<_> = store.get(1).expect("conv").messages.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn history_allocates_unique_local_ids() {
        let mut store = ConversationStore::new("me@x");
        let _ = store.prepend_history(1, &[payload(1, 1, 10), payload(1, 2, 20)]);
        let next = store.next_local_id();

        let locals: Vec<_> = store.get(1).expect("conv").messages.iter().map(|m| m.local_id).collect();
        assert!(locals.iter().all(|l| *l < next));
        assert_ne!(locals[0], locals[1]);
    }

    #[test]
    fn preview_tracks_latest_timestamp_not_position() {
        let mut store = ConversationStore::new("me@x");
        store.append_message(1, Message::received(1, &payload(1, 1, 200)));
        store.append_message(1, Message::received(2, &payload(1, 2, 100)));

        let preview = store.get(1).and_then(|c| c.last_message_preview.clone()).expect("preview");
        assert_eq!(preview.content, "m1");
    }

    #[test]
    fn acknowledge_marks_oldest_pending_from_sender() {
        let mut store = ConversationStore::new("me@x");
        let first = pending(&mut store, 7, "a");
        let second = pending(&mut store, 7, "b");
        let first_local = first.local_id;
        store.append_message(1, first);
        store.append_message(1, second);

        assert_eq!(store.acknowledge_pending(1, 7, 501, at(60)), Some(first_local));

        let conv = store.get(1).expect("conv");
        assert_eq!(conv.messages[0].message_id, Some(501));
        assert_eq!(conv.messages[0].delivery_state, DeliveryState::Sent);
        assert!(conv.messages[1].is_pending());
        assert_eq!(store.acknowledge_pending(1, 9, 502, at(60)), None);
    }

    #[test]
    fn subscribers_see_every_mutation_of_their_conversation_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = ConversationStore::new("me@x");

        let sink = Arc::clone(&seen);
        let sub = store.subscribe(1, move |conv| {
            sink.lock().expect("lock").push(conv.messages.len());
        });

        store.append_message(1, Message::received(1, &payload(1, 1, 10)));
        store.append_message(2, Message::received(2, &payload(2, 2, 10)));
        store.increment_unread(1);
        assert!(store.unsubscribe(sub));
        store.append_message(1, Message::received(3, &payload(1, 3, 10)));

        assert_eq!(*seen.lock().expect("lock"), vec![1, 1]);
        assert!(!store.unsubscribe(sub));
    }

    #[test]
    fn chat_list_orders_newest_first_then_empty_by_id() {
        let mut store = ConversationStore::new("me@x");
        store.set_focus(5, false);
        store.set_focus(3, false);
        store.append_message(1, Message::received(1, &payload(1, 1, 10)));
        store.append_message(2, Message::received(2, &payload(2, 2, 20)));

        let order: Vec<_> = store.chat_list().iter().map(|c| c.id).collect();
        assert_eq!(order, vec![2, 1, 3, 5]);
    }

    #[test]
    fn group_mutations_apply() {
        let mut store = ConversationStore::new("me@x");
        store.upsert_details(ConversationDetails {
            id: 8,
            is_group: true,
            name: Some("Study group".into()),
            picture_url: None,
            participants: vec![participant(7, "me@x"), participant(9, "ana@x")],
        });

        store.set_group_name(8, "Exam prep");
        store.set_group_picture(8, "https://img/1.png");
        assert!(store.set_admin(8, 9, true));
        assert!(store.remove_participant(8, 9));
        assert!(!store.remove_participant(8, 9));

        let conv = store.get(8).expect("conv");
        assert_eq!(conv.display_name, "Exam prep");
        assert_eq!(conv.picture_url.as_deref(), Some("https://img/1.png"));
        assert_eq!(conv.participants.len(), 1);
    }
}
