use chrono::{ Local, TimeZone };
use log::{ error, info, warn };
use std::error::Error;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt };

use crate::models::chat::{ Conversation, Role };
use crate::models::message::MessageProps;
use crate::session::ChatSession;

const MAX_INPUT_SIZE: usize = 1024 * 1024;

const HELP: &str =
    "Commands:
  /new              start a new conversation
  /list             list saved conversations
  /open <id>        open a saved conversation
  /rename <title>   rename the current conversation
  /delete           delete the current conversation
  /clear            delete every conversation
  /history          print the current conversation
  /help             show this help
  /quit             leave
Anything else is sent as a message.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    New,
    List,
    Open(i64),
    Rename(String),
    Delete,
    Clear,
    History,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Send(line.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "new" => ReplCommand::New,
        "list" | "ls" => ReplCommand::List,
        "open" =>
            match rest.parse() {
                Ok(id) => ReplCommand::Open(id),
                Err(_) => ReplCommand::Invalid(format!("Usage: /open <id> (got '{}')", rest)),
            }
        "rename" if !rest.is_empty() => ReplCommand::Rename(rest.to_string()),
        "rename" => ReplCommand::Invalid("Usage: /rename <title>".to_string()),
        "delete" => ReplCommand::Delete,
        "clear" => ReplCommand::Clear,
        "history" => ReplCommand::History,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("Unknown command '/{}', try /help", other)),
    }
}

pub fn format_timestamp(ts_millis: i64) -> String {
    match Local.timestamp_millis_opt(ts_millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts_millis.to_string(),
    }
}

/// Renders a message for the terminal, with a time separator above it when
/// the message carries one.
pub fn render_message(msg: &MessageProps) -> String {
    let mut out = String::new();
    if msg.has_time {
        out.push_str(&format!("── {} ──\n", format_timestamp(msg.created_at)));
    }
    let speaker = match (msg.role, msg.error) {
        (_, true) => "error",
        (Role::User, _) => "you",
        (Role::Assistant, _) => "assistant",
    };
    out.push_str(&format!("[{}] {}\n", speaker, msg.content));
    out
}

pub fn render_conversation_line(conversation: &Conversation) -> String {
    format!(
        "{:>4}  {}  ({} messages)\n",
        conversation.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
        conversation.title,
        conversation.messages.len()
    )
}

async fn write_out<W>(writer: &mut W, text: &str) -> Result<(), Box<dyn Error + Send + Sync>>
    where W: AsyncWrite + Unpin
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Runs a line-oriented chat loop until `/quit` or end of input.
pub async fn run_repl<R, W>(
    session: &mut ChatSession,
    reader: R,
    mut writer: W
) -> Result<(), Box<dyn Error + Send + Sync>>
    where R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin
{
    let mut lines = reader.lines();
    write_out(&mut writer, "Type a message, or /help for commands.\n> ").await?;

    while let Some(line) = lines.next_line().await? {
        if line.len() > MAX_INPUT_SIZE {
            warn!("Input exceeds size limit ({} > {})", line.len(), MAX_INPUT_SIZE);
            write_out(&mut writer, "Message too large\n> ").await?;
            continue;
        }

        let output = match parse_line(&line) {
            ReplCommand::Empty => String::new(),
            ReplCommand::Quit => {
                break;
            }
            ReplCommand::Help => HELP.to_string(),
            ReplCommand::Invalid(message) => format!("{}\n", message),
            ReplCommand::Send(text) => {
                let before = session.messages().len();
                match session.send(&text).await {
                    Ok(_) => {
                        session.messages()[before..].iter().map(render_message).collect::<String>()
                    }
                    Err(e) => {
                        error!("Failed to send message: {}", e);
                        format!("Error: {}\n", e)
                    }
                }
            }
            ReplCommand::New => {
                session.new_conversation();
                "Started a new conversation.\n".to_string()
            }
            ReplCommand::List =>
                match session.list().await {
                    Ok(conversations) if conversations.is_empty() => {
                        "No saved conversations.\n".to_string()
                    }
                    Ok(conversations) => {
                        conversations.iter().map(render_conversation_line).collect::<String>()
                    }
                    Err(e) => format!("Error: {}\n", e),
                }
            ReplCommand::Open(id) =>
                match session.open(id).await {
                    Ok(true) => {
                        let mut out = format!("Opened '{}'.\n", session.title());
                        out.extend(session.messages().iter().map(render_message));
                        out
                    }
                    Ok(false) => format!("No conversation with id {}.\n", id),
                    Err(e) => format!("Error: {}\n", e),
                }
            ReplCommand::Rename(title) =>
                match session.rename(&title).await {
                    Ok(()) => format!("Renamed to '{}'.\n", session.title()),
                    Err(e) => format!("Error: {}\n", e),
                }
            ReplCommand::Delete =>
                match session.delete_current().await {
                    Ok(Some(id)) => format!("Deleted conversation {}.\n", id),
                    Ok(None) => "Nothing saved yet; started over.\n".to_string(),
                    Err(e) => format!("Error: {}\n", e),
                }
            ReplCommand::Clear =>
                match session.clear_all().await {
                    Ok(()) => "All conversations deleted.\n".to_string(),
                    Err(e) => format!("Error: {}\n", e),
                }
            ReplCommand::History => {
                if session.messages().is_empty() {
                    "Nothing here yet.\n".to_string()
                } else {
                    session.messages().iter().map(render_message).collect::<String>()
                }
            }
        };

        write_out(&mut writer, &output).await?;
        write_out(&mut writer, "> ").await?;
    }

    write_out(&mut writer, "\n").await?;
    info!("Chat loop finished (conversation {:?})", session.conversation_id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ ConversationStore, MemoryConversationStore };
    use crate::session::tests::ScriptedClient;
    use std::sync::Arc;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_line("  hello "), ReplCommand::Send("hello".into()));
        assert_eq!(parse_line(""), ReplCommand::Empty);
        assert_eq!(parse_line("/open 12"), ReplCommand::Open(12));
        assert!(matches!(parse_line("/open x"), ReplCommand::Invalid(_)));
        assert_eq!(parse_line("/rename  Road trip "), ReplCommand::Rename("Road trip".into()));
        assert!(matches!(parse_line("/rename"), ReplCommand::Invalid(_)));
        assert_eq!(parse_line("/quit"), ReplCommand::Quit);
        assert!(matches!(parse_line("/bogus"), ReplCommand::Invalid(_)));
    }

    #[tokio::test]
    async fn chat_loop_sends_lists_and_quits() {
        let store = Arc::new(MemoryConversationStore::new());
        let client = ScriptedClient::new(vec![Ok("pong")]);
        let mut session = ChatSession::new(client, store.clone());

        let input: &[u8] = b"ping\n/list\n/quit\nnever sent\n";
        let mut output = Vec::new();
        run_repl(&mut session, input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("[you] ping"));
        assert!(text.contains("[assistant] pong"));
        assert!(text.contains("── "));
        assert!(text.contains("   1  ping  (2 messages)"));
        assert!(!text.contains("never sent"));
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_shown_not_fatal() {
        let store = Arc::new(MemoryConversationStore::new());
        let client = ScriptedClient::new(vec![Err("backend down")]);
        let mut session = ChatSession::new(client, store);

        let input: &[u8] = b"hi\n/open 99\n";
        let mut output = Vec::new();
        run_repl(&mut session, input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("[error] backend down"));
        assert!(text.contains("No conversation with id 99."));
    }
}
