//! Room membership tracker.
//!
//! Tracks the single room a session has joined on the server and produces
//! the `join_chat` / `leave_chat` events that keep server-side membership in
//! step with it.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  join   ┌─────────┐ chat_participant_joined ┌────────┐
//! │ Idle │────────>│ Joining │────────────────────────>│ Joined │
//! └──────┘         └─────────┘                         └────────┘
//!    ^                  │                                   │
//!    └──────────────────┴──── leave / transport drop ───────┘
//! ```
//!
//! A transport drop returns to `Idle` but keeps the target: the next
//! `connect` re-emits `join_chat` for it. There is no join timeout.

use lectern_proto::{ChatId, ClientEvent, JoinChat, ParticipantId};

/// Membership state of the tracked room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Not in a room on the server.
    Idle,
    /// `join_chat` emitted (or waiting for a connection to emit it).
    Joining,
    /// Server acknowledged the join.
    Joined,
}

/// Room the session wants to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomTarget {
    /// Conversation.
    pub chat_id: ChatId,
    /// Our participant id in it.
    pub participant_id: ParticipantId,
}

/// Tracks at most one active room.
#[derive(Debug, Clone)]
pub struct RoomTracker {
    target: Option<RoomTarget>,
    state: RoomState,
    connected: bool,
    /// `join_chat` for the target went out on the current connection.
    join_emitted: bool,
}

impl Default for RoomTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomTracker {
    /// Tracker with no room and no connection.
    pub fn new() -> Self {
        Self { target: None, state: RoomState::Idle, connected: false, join_emitted: false }
    }

    /// Current state.
    pub fn state(&self) -> RoomState {
        self.state
    }

    /// Conversation currently targeted, joined or not.
    pub fn active_conversation(&self) -> Option<ChatId> {
        self.target.map(|t| t.chat_id)
    }

    /// Target room with our participant id.
    pub fn target(&self) -> Option<RoomTarget> {
        self.target
    }

    /// Enter a room, leaving the previous one first.
    ///
    /// Joining the active room again is a no-op. While disconnected the join
    /// is deferred until [`Self::on_connected`].
    pub fn join(&mut self, chat_id: ChatId, participant_id: ParticipantId) -> Vec<ClientEvent> {
        let target = RoomTarget { chat_id, participant_id };
        if self.target == Some(target) {
            return vec![];
        }

        let mut events = self.leave();
        self.target = Some(target);
        self.state = RoomState::Joining;
        if self.connected {
            events.push(self.emit_join(target));
        } else {
            tracing::debug!(chat_id, "join deferred until connected");
        }
        events
    }

    /// Exit the room. Idempotent.
    ///
    /// `leave_chat` is only emitted if a join went out on this connection.
    pub fn leave(&mut self) -> Vec<ClientEvent> {
        let emitted = std::mem::take(&mut self.join_emitted);
        self.target = None;
        self.state = RoomState::Idle;
        if emitted && self.connected { vec![ClientEvent::LeaveChat] } else { vec![] }
    }

    /// Transport connected (or reconnected). Emits the pending join, if any.
    pub fn on_connected(&mut self) -> Vec<ClientEvent> {
        self.connected = true;
        match self.target {
            Some(target) if !self.join_emitted => {
                self.state = RoomState::Joining;
                vec![self.emit_join(target)]
            },
            _ => vec![],
        }
    }

    /// Transport dropped. Server-side membership is gone; the target stays.
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.join_emitted = false;
        self.state = RoomState::Idle;
    }

    /// Server acknowledged a join.
    pub fn on_joined(&mut self) {
        if self.state == RoomState::Joining && self.join_emitted {
            self.state = RoomState::Joined;
        }
    }

    fn emit_join(&mut self, target: RoomTarget) -> ClientEvent {
        self.join_emitted = true;
        tracing::debug!(chat_id = target.chat_id, "joining room");
        ClientEvent::JoinChat(JoinChat {
            chat_id: target.chat_id,
            chat_participant_id: target.participant_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join_event(chat_id: ChatId, participant_id: ParticipantId) -> ClientEvent {
        ClientEvent::JoinChat(JoinChat { chat_id, chat_participant_id: participant_id })
    }

    fn connected() -> RoomTracker {
        let mut tracker = RoomTracker::new();
        let _ = tracker.on_connected();
        tracker
    }

    #[test]
    fn join_while_connected_emits_immediately() {
        let mut tracker = connected();

        assert_eq!(tracker.join(42, 7), vec![join_event(42, 7)]);
        assert_eq!(tracker.state(), RoomState::Joining);
        assert_eq!(tracker.active_conversation(), Some(42));

        tracker.on_joined();
        assert_eq!(tracker.state(), RoomState::Joined);
    }

    #[test]
    fn join_while_disconnected_defers_until_connect() {
        let mut tracker = RoomTracker::new();

        assert!(tracker.join(42, 7).is_empty());
        assert_eq!(tracker.state(), RoomState::Joining);
        assert_eq!(tracker.on_connected(), vec![join_event(42, 7)]);
    }

    #[test]
    fn switching_rooms_leaves_then_joins() {
        let mut tracker = connected();
        let _ = tracker.join(1, 7);

        assert_eq!(tracker.join(2, 7), vec![ClientEvent::LeaveChat, join_event(2, 7)]);
        assert_eq!(tracker.active_conversation(), Some(2));
    }

    #[test]
    fn rejoining_active_room_is_noop() {
        let mut tracker = connected();
        let _ = tracker.join(1, 7);
        assert!(tracker.join(1, 7).is_empty());
    }

    #[test]
    fn leave_is_idempotent() {
        let mut tracker = connected();
        let _ = tracker.join(1, 7);

        assert_eq!(tracker.leave(), vec![ClientEvent::LeaveChat]);
        assert!(tracker.leave().is_empty());
        assert_eq!(tracker.active_conversation(), None);
    }

    #[test]
    fn leave_before_join_went_out_emits_nothing() {
        let mut tracker = RoomTracker::new();
        let _ = tracker.join(1, 7);
        assert!(tracker.leave().is_empty());
    }

    #[test]
    fn drop_keeps_target_and_rejoins_on_reconnect() {
        let mut tracker = connected();
        let _ = tracker.join(1, 7);
        tracker.on_joined();

        tracker.on_disconnected();
        assert_eq!(tracker.state(), RoomState::Idle);
        assert_eq!(tracker.active_conversation(), Some(1));

        // Server forgot the room; nothing to leave while down
        assert_eq!(tracker.on_connected(), vec![join_event(1, 7)]);
        assert_eq!(tracker.state(), RoomState::Joining);
    }

    #[test]
    fn stale_ack_after_drop_is_ignored() {
        let mut tracker = connected();
        let _ = tracker.join(1, 7);
        tracker.on_disconnected();

        tracker.on_joined();
        assert_eq!(tracker.state(), RoomState::Idle);
    }
}
