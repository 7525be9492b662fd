//! Lectern chat command-line client.
//!
//! Reads commands from stdin and prints room traffic to stdout. Logs go to
//! stderr.
//!
//! # Usage
//!
//! ```bash
//! LECTERN_TOKEN=... lectern-chat --server https://chat.example \
//!     --api https://api.example --email me@school.example --chat 42
//! ```

use clap::Parser;
use lectern_client::{
    ChatError, ChatId, ChatRuntime, ConversationStore, EventKind, Notification, ParticipantId,
    ServerEvent, SessionConfig, SystemEnv, http::HttpApi, websocket::WebSocketTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Lectern chat client
#[derive(Parser, Debug)]
#[command(name = "lectern-chat")]
#[command(about = "Line-based client for the Lectern chat server")]
#[command(version)]
struct Args {
    /// Chat server URL (http, https, ws or wss)
    #[arg(short, long, env = "LECTERN_SERVER")]
    server: String,

    /// REST API base URL
    #[arg(short, long, env = "LECTERN_API")]
    api: String,

    /// Account email, used to find yourself in conversation rosters
    #[arg(short, long, env = "LECTERN_EMAIL")]
    email: String,

    /// Bearer token for the REST API
    #[arg(long, env = "LECTERN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Conversation to join on start
    #[arg(short, long)]
    chat: Option<ChatId>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Send(String),
    Join(ChatId),
    Leave,
    History(u32),
    List,
    Search(String),
    Rename(String),
    Picture(String),
    Promote(ParticipantId),
    Remove(ParticipantId),
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  <text>              send a message
  /join <chat>        enter a conversation
  /leave              leave it
  /history <page>     load older messages
  /list               show conversations
  /search <query>     find participants
  /rename <name>      rename the group
  /picture <url>      change the group picture
  /promote <id>       make a member admin
  /remove <id>        remove a member
  /quit";

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_owned()));
        };
        let (name, arg) = rest.split_once(' ').map_or((rest, ""), |(n, a)| (n, a.trim()));
        let number = |what: &str| arg.parse::<u64>().map_err(|_| format!("/{name} needs a {what}"));

        match name {
            "join" => number("chat id").map(Self::Join),
            "leave" => Ok(Self::Leave),
            "history" => {
                arg.parse().map(Self::History).map_err(|_| "/history needs a page".to_owned())
            },
            "list" => Ok(Self::List),
            "search" => Ok(Self::Search(arg.to_owned())),
            "rename" => Ok(Self::Rename(arg.to_owned())),
            "picture" => Ok(Self::Picture(arg.to_owned())),
            "promote" => number("participant id").map(Self::Promote),
            "remove" => number("participant id").map(Self::Remove),
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command /{other}, try /help")),
        }
    }
}

type Runtime = ChatRuntime<WebSocketTransport, HttpApi, SystemEnv>;

/// Room traffic and command output go to stdout.
#[allow(clippy::print_stdout)]
fn say(line: impl std::fmt::Display) {
    println!("{line}");
}

fn report(result: Result<(), ChatError>) {
    if let Err(err) = result {
        say(format_args!("error: {err}"));
    }
}

fn install_listeners(runtime: &mut Runtime) {
    runtime.on(EventKind::NewMessage, |notification| {
        if let Notification::Server(ServerEvent::NewMessage(m)) = notification {
            say(format_args!("[{}] {}: {}", m.timestamp.format("%H:%M"), m.sender_id, m.content));
        }
    });
    runtime.on(EventKind::Connect, |_| say("-- connected"));
    runtime.on(EventKind::Disconnect, |notification| {
        if let Notification::Disconnect { reason } = notification {
            say(format_args!("-- disconnected: {reason}"));
        }
    });
}

/// Run one command. Returns false to quit.
async fn run_command(runtime: &mut Runtime, command: Command) -> bool {
    match command {
        Command::Send(text) => report(runtime.send_message(&text).await),
        Command::Join(chat_id) => report(runtime.join_conversation(chat_id).await),
        Command::Leave => report(runtime.leave_conversation().await),
        Command::History(page) => report(runtime.load_history(page).await),
        Command::List => {
            for conv in runtime.chat_list().await {
                let preview = conv.last_message_preview.as_ref().map_or("", |p| p.content.as_str());
                say(format_args!(
                    "{:>6} {:<24} {:>3} unread  {preview}",
                    conv.id, conv.display_name, conv.unread_count
                ));
            }
        },
        Command::Search(query) => match runtime.search_participants(&query, 1, 20).await {
            Ok(users) => {
                for user in users {
                    say(format_args!("{:>6} {} <{}>", user.user_id, user.display_name, user.email));
                }
            },
            Err(err) => say(format_args!("error: {err}")),
        },
        Command::Rename(name) => report(runtime.rename_group(&name).await),
        Command::Picture(url) => report(runtime.change_group_picture(&url).await),
        Command::Promote(id) => report(runtime.promote_participant(id).await),
        Command::Remove(id) => report(runtime.remove_participant(id).await),
        Command::Help => say(HELP),
        Command::Quit => return false,
    }

    if let Some(status) = runtime.status() {
        say(format_args!("-- {status}"));
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let store = ConversationStore::new(args.email.clone()).shared();
    let mut runtime = ChatRuntime::new(
        SessionConfig::new(args.server.clone()),
        SystemEnv::new(),
        WebSocketTransport::new(),
        HttpApi::new(args.api.clone(), args.token.clone()),
        store,
    );
    install_listeners(&mut runtime);
    tracing::info!(server = %args.server, api = %args.api, "lectern chat starting");

    // Without a conversation, stay connected for chat-list updates
    match args.chat {
        Some(chat_id) => report(runtime.join_conversation(chat_id).await),
        None => report(runtime.connect().await),
    }
    let mut listening = true;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = runtime.next_event(), if listening => match event {
                Some(event) => report(runtime.handle_transport_event(event).await),
                None => listening = false,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(command) => {
                        if matches!(command, Command::Join(_)) {
                            listening = true;
                        }
                        if !run_command(&mut runtime, command).await {
                            break;
                        }
                    },
                    Err(message) => say(message),
                }
            },
        }
    }

    report(runtime.leave_conversation().await);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(Command::parse("  hello there "), Ok(Command::Send("hello there".into())));
    }

    #[test]
    fn commands_take_arguments() {
        assert_eq!(Command::parse("/join 42"), Ok(Command::Join(42)));
        assert_eq!(Command::parse("/history 3"), Ok(Command::History(3)));
        assert_eq!(Command::parse("/rename  Exam prep"), Ok(Command::Rename("Exam prep".into())));
        assert_eq!(Command::parse("/quit"), Ok(Command::Quit));
    }

    #[test]
    fn bad_arguments_are_explained() {
        assert_eq!(Command::parse("/join abc"), Err("/join needs a chat id".into()));
        assert_eq!(Command::parse("/dance"), Err("unknown command /dance, try /help".into()));
    }
}
