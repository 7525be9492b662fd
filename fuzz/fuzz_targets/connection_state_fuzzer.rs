//! Fuzz target for the connection state machine
//!
//! # Strategy
//!
//! Interleave server frames (valid and garbage), socket drops, clock ticks
//! and local connect/emit/disconnect calls on one connection.
//!
//! # Invariants
//!
//! - No input panics
//! - `emit` succeeds only while connected
//! - Reconnect delays never exceed the configured maximum
//! - Reconnect attempts never exceed the configured budget
//! - Server events are delivered only while connected

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use lectern_core::{ConnectOptions, Connection, ConnectionAction, Environment};
use lectern_harness::SimEnv;
use lectern_proto::ClientEvent;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    attempts: u8,
    ops: Vec<Op>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Connect,
    Open,
    NamespaceConnect,
    Ping,
    Event,
    Garbage(String),
    ServerClose,
    SocketClosed,
    Tick(u16),
    Emit,
    Disconnect,
}

const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
const EVENT: &str = r#"42["chat_participant_joined",{}]"#;

fuzz_target!(|scenario: Scenario| {
    let env = SimEnv::with_seed(scenario.seed);
    let options = ConnectOptions {
        reconnection_attempts: u32::from(scenario.attempts % 8),
        ..ConnectOptions::default()
    };
    let max_delay = options.reconnection_delay_max;
    let budget = options.reconnection_attempts;
    let mut conn = Connection::new(env.clone(), options);

    for op in scenario.ops {
        let was_connected = conn.is_connected();
        let now = env.now();
        let actions = match op {
            Op::Connect => conn.connect("http://chat.fuzz", now),
            Op::Open => conn.handle_text(OPEN, now).unwrap_or_default(),
            Op::NamespaceConnect => conn.handle_text(r#"40{"sid":"n1"}"#, now).unwrap_or_default(),
            Op::Ping => conn.handle_text("2", now).unwrap_or_default(),
            Op::Event => conn.handle_text(EVENT, now).unwrap_or_default(),
            Op::Garbage(text) => conn.handle_text(&text, now).unwrap_or_default(),
            Op::ServerClose => conn.handle_text("1", now).unwrap_or_default(),
            Op::SocketClosed => conn.handle_socket_closed(now, "reset"),
            Op::Tick(ms) => {
                env.advance(Duration::from_millis(u64::from(ms) * 10));
                conn.handle_tick(env.now())
            },
            Op::Emit => {
                let result = conn.emit(&ClientEvent::LeaveChat);
                assert_eq!(result.is_ok(), was_connected);
                result.unwrap_or_default()
            },
            Op::Disconnect => conn.disconnect(),
        };

        for action in actions {
            match action {
                ConnectionAction::Reconnecting { attempt, delay } => {
                    assert!(delay <= max_delay, "delay {delay:?} over cap");
                    assert!(attempt <= budget, "attempt {attempt} over budget {budget}");
                },
                ConnectionAction::Deliver(_) => assert!(was_connected),
                _ => {},
            }
        }
    }
});
