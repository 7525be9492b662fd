//! Fuzz target for the session state machine and conversation store
//!
//! # Strategy
//!
//! Random user operations (join, leave, send, focus), transport lifecycle
//! changes, server broadcasts with colliding ids and REST responses answered
//! in any order, including stale ones.
//!
//! # Invariants
//!
//! - No input panics
//! - Every standard store invariant holds after every step
//! - At most one room is joined at a time
//! - Blank sends never reach the store

#![no_main]

use arbitrary::Arbitrary;
use chrono::DateTime;
use lectern_client::{
    ApiCall, ApiRequest, ApiResponse, ConversationDetails, ConversationStore, Participant,
    Session, SessionAction, SessionConfig, SessionEvent,
};
use lectern_harness::{InvariantRegistry, SimEnv, StoreSnapshot};
use lectern_proto::{ClientEvent, MessagePayload, ServerEvent};
use libfuzzer_sys::fuzz_target;

const SELF_ID: u64 = 7;

#[derive(Debug, Arbitrary)]
enum Op {
    Connect,
    Join(u8),
    Leave,
    Send(String),
    Focus(u8, bool),
    Connected,
    Disconnected,
    Unavailable,
    Joined,
    NewMessage { chat: u8, id: u8, from_self: bool, secs: u16 },
    UpdateChat { chat: u8, id: u8, from_self: bool, secs: u16 },
    Answer(u8),
    Fail(u8),
}

fn details(chat_id: u64) -> ConversationDetails {
    let member = |participant_id, email: &str| Participant {
        participant_id,
        email: email.into(),
        display_name: email.into(),
        profile_picture_url: None,
        is_admin: false,
    };
    ConversationDetails {
        id: chat_id,
        is_group: chat_id % 2 == 0,
        name: Some(format!("chat {chat_id}")),
        picture_url: None,
        participants: vec![member(SELF_ID, "me@fuzz"), member(9, "other@fuzz")],
    }
}

fn payload(chat: u8, id: u8, from_self: bool, secs: u16) -> MessagePayload {
    MessagePayload {
        chat_id: u64::from(chat % 4),
        message_id: u64::from(id),
        sender_id: if from_self { SELF_ID } else { 9 },
        content: format!("m{id}"),
        timestamp: DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default(),
    }
}

fn response(call: &ApiCall) -> ApiResponse {
    match call {
        ApiCall::Details { chat_id } => ApiResponse::Details(details(*chat_id)),
        ApiCall::History { .. } => ApiResponse::History(vec![]),
        _ => ApiResponse::Done,
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut store = ConversationStore::new("me@fuzz");
    let mut session = Session::new(SessionConfig::new("http://chat.fuzz"), SimEnv::new());
    let registry = InvariantRegistry::standard();
    let mut pending: Vec<ApiRequest> = Vec::new();
    let mut in_room: Option<u64> = None;

    for op in ops {
        let actions = match op {
            Op::Join(chat) => session.join_conversation(&mut store, u64::from(chat % 4)),
            Op::Leave => session.leave_conversation(&mut store),
            Op::Send(text) => {
                let before = store.get(session.active_conversation().unwrap_or(0)).map(|c| c.messages.len());
                let result = session.send_message(&mut store, &text);
                if text.trim().is_empty() {
                    assert!(result.is_err());
                    let after = store.get(session.active_conversation().unwrap_or(0)).map(|c| c.messages.len());
                    assert_eq!(before, after);
                }
                result.unwrap_or_default()
            },
            Op::Focus(chat, focused) => {
                session.set_focus(&mut store, u64::from(chat % 4), focused);
                vec![]
            },
            Op::Connect => session.connect(),
            Op::Connected => session.handle(&mut store, SessionEvent::Connected),
            Op::Disconnected => {
                in_room = None;
                session.handle(&mut store, SessionEvent::Disconnected { reason: "fuzz".into() })
            },
            Op::Unavailable => {
                in_room = None;
                session.handle(&mut store, SessionEvent::Unavailable { reason: "fuzz".into() })
            },
            Op::Joined => session.handle(&mut store, SessionEvent::Server(ServerEvent::ChatParticipantJoined)),
            Op::NewMessage { chat, id, from_self, secs } => {
                let event = ServerEvent::NewMessage(payload(chat, id, from_self, secs));
                session.handle(&mut store, SessionEvent::Server(event))
            },
            Op::UpdateChat { chat, id, from_self, secs } => {
                let event = ServerEvent::UpdateChat(payload(chat, id, from_self, secs));
                session.handle(&mut store, SessionEvent::Server(event))
            },
            Op::Answer(_) | Op::Fail(_) if pending.is_empty() => vec![],
            Op::Answer(pick) => {
                let request = pending.remove(usize::from(pick) % pending.len());
                let result = Ok(response(&request.call));
                session.handle(&mut store, SessionEvent::Response { id: request.id, result })
            },
            Op::Fail(pick) => {
                let request = pending.remove(usize::from(pick) % pending.len());
                let result = Err(lectern_client::ApiError::Network("fuzz".into()));
                session.handle(&mut store, SessionEvent::Response { id: request.id, result })
            },
        };

        for action in actions {
            match action {
                SessionAction::Request(request) => pending.push(request),
                SessionAction::Emit(ClientEvent::JoinChat(join)) => {
                    assert_eq!(in_room, None, "joined {} while in {:?}", join.chat_id, in_room);
                    in_room = Some(join.chat_id);
                },
                SessionAction::Emit(ClientEvent::LeaveChat) | SessionAction::Disconnect => in_room = None,
                _ => {},
            }
        }

        let snapshot = StoreSnapshot::capture(&store, session.active_conversation());
        if let Err(violations) = registry.check_all(&snapshot) {
            panic!("invariant violated: {violations:?}");
        }
    }
});
