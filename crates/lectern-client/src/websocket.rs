//! WebSocket transport.
//!
//! [`WebSocketTransport`] spawns one task per connection that owns the
//! socket and drives the Sans-IO [`Connection`] state machine: frames, ticks
//! and emit commands go in, [`ConnectionAction`]s come out and are executed
//! here. The task reports lifecycle changes and broadcasts over a channel.

use std::{collections::VecDeque, time::Duration};

use futures::{SinkExt, StreamExt};
use lectern_core::{ConnectOptions, Connection, ConnectionAction, Environment};
use lectern_proto::ClientEvent;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{Error as WsError, Message as WsMessage},
};

use crate::{
    error::TransportError,
    system_env::SystemEnv,
    transport::{Transport, TransportEvent},
};

/// How often the connection task checks timeouts and due reconnects.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// How long `disconnect` waits for the connection task before aborting it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
enum Command {
    Connect(String),
    Emit(ClientEvent),
    Disconnect,
}

/// Socket.IO over WebSocket.
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    commands: Option<mpsc::UnboundedSender<Command>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Transport with no connection task yet.
    pub fn new() -> Self {
        Self::default()
    }

    fn running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Transport for WebSocketTransport {
    async fn connect(
        &mut self,
        server_url: &str,
        options: &ConnectOptions,
    ) -> Result<(), TransportError> {
        if self.running() {
            let commands = self.commands.as_ref().ok_or(TransportError::NotStarted)?;
            return commands
                .send(Command::Connect(server_url.to_owned()))
                .map_err(|_| TransportError::Closed);
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(server_url.to_owned(), options.clone(), command_rx, event_tx));

        self.commands = Some(command_tx);
        self.events = Some(event_rx);
        self.task = Some(task);
        Ok(())
    }

    async fn emit(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        let commands = self.commands.as_ref().ok_or(TransportError::NotStarted)?;
        commands.send(Command::Emit(event)).map_err(|_| TransportError::Closed)
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    async fn disconnect(&mut self) {
        self.events = None;
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Disconnect);
        }
        if let Some(mut task) = self.task.take()
            && tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err()
        {
            // Still inside a socket open; it would not see the command in time
            tracing::warn!("connection task did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Connection task: owns the socket until told to disconnect.
async fn drive(
    server_url: String,
    options: ConnectOptions,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let env = SystemEnv::new();
    let connect_timeout = options.connect_timeout;
    let mut conn = Connection::new(env, options);
    let mut socket: Option<Socket> = None;
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut pending: VecDeque<ConnectionAction> = conn.connect(&server_url, env.now()).into();

    loop {
        while let Some(action) = pending.pop_front() {
            match action {
                ConnectionAction::OpenSocket { url } => {
                    match open(&url, connect_timeout).await {
                        Ok(ws) => socket = Some(ws),
                        Err(reason) => {
                            tracing::warn!(%url, %reason, "socket open failed");
                            pending.extend(conn.handle_socket_closed(env.now(), &reason));
                        },
                    }
                },
                ConnectionAction::SendText(text) => {
                    let sent = match socket.as_mut() {
                        Some(ws) => ws.send(WsMessage::Text(text)).await.map_err(|e| e.to_string()),
                        None => Ok(()),
                    };
                    if let Err(reason) = sent {
                        socket = None;
                        pending.extend(conn.handle_socket_closed(env.now(), &reason));
                    }
                },
                ConnectionAction::CloseSocket => {
                    if let Some(mut ws) = socket.take() {
                        let _ = ws.close(None).await;
                    }
                },
                ConnectionAction::Connected { .. } => {
                    let _ = events.send(TransportEvent::Connected);
                },
                ConnectionAction::Disconnected { reason } => {
                    let _ = events.send(TransportEvent::Disconnected { reason });
                },
                ConnectionAction::Reconnecting { attempt, delay } => {
                    tracing::info!(attempt, ?delay, "reconnect scheduled");
                },
                ConnectionAction::Unavailable { attempts } => {
                    let _ = events.send(TransportEvent::Unavailable { attempts });
                },
                ConnectionAction::Deliver(event) => {
                    let _ = events.send(TransportEvent::Server(event));
                },
            }
        }

        tokio::select! {
            frame = next_frame(&mut socket) => {
                let now = env.now();
                match frame {
                    Some(Ok(WsMessage::Text(text))) => match conn.handle_text(&text, now) {
                        Ok(actions) => pending.extend(actions),
                        Err(err) => tracing::warn!(%err, "dropping inbound frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        socket = None;
                        pending.extend(conn.handle_socket_closed(now, "closed by server"));
                    },
                    Some(Ok(_)) => {},
                    Some(Err(err)) => {
                        socket = None;
                        pending.extend(conn.handle_socket_closed(now, &err.to_string()));
                    },
                }
            },
            command = commands.recv() => match command {
                Some(Command::Connect(url)) => pending.extend(conn.connect(&url, env.now())),
                Some(Command::Emit(event)) => match conn.emit(&event) {
                    Ok(actions) => pending.extend(actions),
                    Err(err) => tracing::warn!(event = event.name(), %err, "emit dropped"),
                },
                Some(Command::Disconnect) | None => {
                    for action in conn.disconnect() {
                        match (action, socket.as_mut()) {
                            (ConnectionAction::SendText(text), Some(ws)) => {
                                let _ = ws.send(WsMessage::Text(text)).await;
                            },
                            (ConnectionAction::CloseSocket, Some(ws)) => {
                                let _ = ws.close(None).await;
                            },
                            _ => {},
                        }
                    }
                    tracing::debug!("connection task stopped");
                    return;
                },
            },
            _ = ticker.tick() => pending.extend(conn.handle_tick(env.now())),
        }
    }
}

async fn open(url: &str, timeout: Duration) -> Result<Socket, String> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("no answer within {timeout:?}")),
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<WsMessage, WsError>> {
    match socket {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}
