//! Integration tests for the WebSocket transport.
//!
//! These tests run a minimal Socket.IO server on a local port and drive a
//! real [`WebSocketTransport`] against it: handshake, event framing,
//! heartbeats, reconnection and shutdown.

#![cfg(feature = "websocket")]

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lectern_client::{
    ClientEvent, ConnectOptions, ServerEvent, Transport, TransportEvent,
    websocket::WebSocketTransport,
};
use lectern_proto::{JoinChat, MessagePayload};
use tokio::{io::AsyncReadExt, net::TcpListener, sync::mpsc, time::timeout};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

const OPEN: &str =
    r#"0{"sid":"e1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
const CONNECT_ACK: &str = r#"40{"sid":"s1"}"#;

/// What the server received.
#[derive(Debug, PartialEq, Eq)]
enum Seen {
    Frame(String),
    Closed,
}

enum Push {
    Frame(String),
    Close,
}

/// Socket.IO server accepting one client at a time.
struct TestServer {
    url: String,
    seen: mpsc::UnboundedReceiver<Seen>,
    push: mpsc::UnboundedSender<Push>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("http://{}", listener.local_addr().expect("addr"));
        let (seen_tx, seen) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if ws.send(Message::Text(OPEN.into())).await.is_err() {
                    continue;
                }
                loop {
                    tokio::select! {
                        frame = ws.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                if text == "40" {
                                    let _ = ws.send(Message::Text(CONNECT_ACK.into())).await;
                                }
                                let _ = seen_tx.send(Seen::Frame(text));
                            },
                            Some(Ok(Message::Close(_)) | Err(_)) | None => {
                                let _ = seen_tx.send(Seen::Closed);
                                break;
                            },
                            Some(Ok(_)) => {},
                        },
                        push = push_rx.recv() => match push {
                            Some(Push::Frame(text)) => {
                                let _ = ws.send(Message::Text(text)).await;
                            },
                            Some(Push::Close) => {
                                let _ = ws.close(None).await;
                            },
                            None => return,
                        },
                    }
                }
            }
        });

        Self { url, seen, push }
    }

    async fn next_seen(&mut self) -> Seen {
        timeout(WAIT, self.seen.recv()).await.expect("server saw nothing").expect("server stopped")
    }

    fn send(&self, text: &str) {
        let _ = self.push.send(Push::Frame(text.to_owned()));
    }

    fn close(&self) {
        let _ = self.push.send(Push::Close);
    }
}

fn fast_reconnect() -> ConnectOptions {
    ConnectOptions {
        reconnection_delay: Duration::from_millis(10),
        randomization_factor: 0.0,
        ..ConnectOptions::default()
    }
}

async fn next_event(transport: &mut WebSocketTransport) -> TransportEvent {
    timeout(WAIT, transport.next_event()).await.expect("no event in time").expect("transport closed")
}

/// Transport connected to `server`, with the namespace handshake consumed.
async fn connected(server: &mut TestServer) -> WebSocketTransport {
    let mut transport = WebSocketTransport::new();
    transport.connect(&server.url, &fast_reconnect()).await.expect("connect");

    assert_eq!(next_event(&mut transport).await, TransportEvent::Connected);
    assert_eq!(server.next_seen().await, Seen::Frame("40".into()));
    transport
}

#[tokio::test]
async fn events_are_framed_as_socket_io() {
    let mut server = TestServer::start().await;
    let mut transport = connected(&mut server).await;

    let join = ClientEvent::JoinChat(JoinChat { chat_id: 42, chat_participant_id: 7 });
    transport.emit(join).await.expect("emit");

    assert_eq!(
        server.next_seen().await,
        Seen::Frame(r#"42["join_chat",{"chat_id":42,"chat_participant_id":7}]"#.into())
    );
    transport.disconnect().await;
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let mut server = TestServer::start().await;
    let mut transport = connected(&mut server).await;

    server.send("2");

    assert_eq!(server.next_seen().await, Seen::Frame("3".into()));
    transport.disconnect().await;
}

#[tokio::test]
async fn server_broadcasts_are_delivered() {
    let mut server = TestServer::start().await;
    let mut transport = connected(&mut server).await;

    server.send(
        r#"42["new_message",{"chat_id":42,"message_id":501,"sender_id":9,"content":"hi","timestamp":"2025-01-04T10:00:00Z"}]"#,
    );

    let expected = MessagePayload {
        chat_id: 42,
        message_id: 501,
        sender_id: 9,
        content: "hi".into(),
        timestamp: "2025-01-04T10:00:00Z".parse().expect("timestamp"),
    };
    assert_eq!(
        next_event(&mut transport).await,
        TransportEvent::Server(ServerEvent::NewMessage(expected))
    );
    transport.disconnect().await;
}

#[tokio::test]
async fn disconnect_leaves_namespace_and_stops_events() {
    let mut server = TestServer::start().await;
    let mut transport = connected(&mut server).await;

    transport.disconnect().await;

    assert_eq!(server.next_seen().await, Seen::Frame("41".into()));
    assert_eq!(server.next_seen().await, Seen::Closed);

    server.send("2");
    assert_eq!(transport.next_event().await, None);
    assert!(transport.emit(ClientEvent::LeaveChat).await.is_err());
}

#[tokio::test]
async fn dropped_link_is_reconnected() {
    let mut server = TestServer::start().await;
    let mut transport = connected(&mut server).await;

    server.close();

    assert!(matches!(next_event(&mut transport).await, TransportEvent::Disconnected { .. }));
    assert_eq!(server.next_seen().await, Seen::Closed);
    assert_eq!(next_event(&mut transport).await, TransportEvent::Connected);
    assert_eq!(server.next_seen().await, Seen::Frame("40".into()));
    transport.disconnect().await;
}

#[tokio::test]
async fn unreachable_server_becomes_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let mut transport = WebSocketTransport::new();
    let options = ConnectOptions { reconnection_attempts: 2, ..fast_reconnect() };
    transport.connect(&url, &options).await.expect("task started");

    assert_eq!(next_event(&mut transport).await, TransportEvent::Unavailable { attempts: 2 });
    transport.disconnect().await;
}

#[tokio::test]
async fn disconnect_aborts_a_stalled_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));

    let mut transport = WebSocketTransport::new();
    transport.connect(&url, &ConnectOptions::default()).await.expect("task started");

    // Accept the TCP stream but never answer the upgrade request
    let (mut stream, _) = timeout(WAIT, listener.accept()).await.expect("no dial").expect("accept");
    transport.disconnect().await;

    let mut buf = [0u8; 1024];
    let closed = timeout(Duration::from_secs(3), async {
        while let Ok(n) = stream.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket still open after disconnect");
}
