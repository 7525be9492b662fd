//! Fuzz target for inbound frame decoding
//!
//! Feeds arbitrary text through the Engine.IO and Socket.IO decoders and the
//! server event parser to find:
//! - Parser panics on truncated or malformed prefixes
//! - Namespace or ack id parsing that over-reads
//! - Payload shapes that bypass validation
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lectern_proto::{EnginePacket, ServerEvent, SocketPacket};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(EnginePacket::Message(inner)) = EnginePacket::decode(text) {
        if let Ok(packet) = SocketPacket::decode(&inner) {
            let _ = ServerEvent::from_packet(&packet);
        }
    }

    if let Ok(packet) = SocketPacket::decode(text) {
        let _ = SocketPacket::decode(&packet.encode());
        let _ = packet.event_parts();
    }
});
