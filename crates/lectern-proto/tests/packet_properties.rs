//! Property-based tests for packet decoding.
//!
//! The decoder faces untrusted server text, so the core property is that it
//! never panics. Event encoding must survive the Engine.IO wrapping intact.

use chrono::{DateTime, Utc};
use lectern_proto::{EnginePacket, MessagePayload, ServerEvent, SocketPacket};
use proptest::prelude::*;

/// Strategy for RFC 3339 timestamps at second precision.
fn arbitrary_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800).prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_default())
}

/// Strategy for message broadcasts with arbitrary text.
fn arbitrary_message() -> impl Strategy<Value = MessagePayload> {
    (any::<u64>(), any::<u64>(), any::<u64>(), ".{0,64}", arbitrary_timestamp()).prop_map(
        |(chat_id, message_id, sender_id, content, timestamp)| MessagePayload {
            chat_id,
            message_id,
            sender_id,
            content,
            timestamp,
        },
    )
}

fn arbitrary_server_event() -> impl Strategy<Value = ServerEvent> {
    prop_oneof![
        1 => Just(ServerEvent::ChatParticipantJoined),
        3 => arbitrary_message().prop_map(ServerEvent::NewMessage),
        3 => arbitrary_message().prop_map(ServerEvent::UpdateChat),
    ]
}

proptest! {
    #[test]
    fn prop_engine_decode_never_panics(text in ".{0,256}") {
        let _ = EnginePacket::decode(&text);
    }

    #[test]
    fn prop_socket_decode_never_panics(text in "[0-9/,\\[\\]{}\":a-z]{0,128}") {
        let _ = SocketPacket::decode(&text);
    }

    #[test]
    fn prop_server_event_survives_engine_wrapping(event in arbitrary_server_event()) {
        let text = EnginePacket::message(&event.to_packet().expect("packet"))
            .encode()
            .expect("encode");

        let EnginePacket::Message(body) = EnginePacket::decode(&text).expect("engine decode") else {
            return Err(TestCaseError::fail("not a message packet"));
        };
        let packet = SocketPacket::decode(&body).expect("socket decode");

        // PROPERTY: the typed event is recovered exactly, including unicode content
        prop_assert_eq!(ServerEvent::from_packet(&packet).expect("event"), event);
    }
}
