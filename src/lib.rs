pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod messages;
pub mod models;
pub mod repl;
pub mod server;
pub mod session;

use cli::{ Args, Command };
use history::{ initialize_conversation_store, ConversationStore };
use llm::LlmConfig;
use llm::chat::{ ChatClient, new_client as new_chat_client };
use log::info;
use models::chat::ConversationPatch;
use server::Server;
use session::ChatSession;
use std::error::Error;
use std::sync::Arc;
use tokio::io::{ AsyncWriteExt, BufReader };

pub fn llm_config_from_args(args: &Args) -> Result<LlmConfig, Box<dyn Error + Send + Sync>> {
    Ok(LlmConfig {
        llm_type: args.chat_llm_type.parse()?,
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
        temperature: args.chat_temperature,
        fallback: args.chat_fallback,
    })
}

fn initialize_chat_client(args: &Args) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
    let config = llm_config_from_args(args)?;
    let client = new_chat_client(&config)?;
    info!(
        "Chat client configured: Type={}, Model={}, BaseURL={}, Fallback={}",
        config.llm_type,
        client.get_model(),
        client.get_base_url().as_deref().unwrap_or("none"),
        config.fallback
    );
    Ok(client)
}

fn log_configuration(args: &Args) {
    info!("--- Core Configuration ---");
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("History Store Type: {}", args.history_type);
    match args.history_type.as_str() {
        "sqlite" => info!("History Database: {}", args.history_db_path),
        "redis" => info!("History Store Host: {}", args.history_host),
        _ => {}
    }
    if matches!(args.command, Some(Command::Proxy)) {
        info!("Proxy Address: {}", args.proxy_addr);
        info!("Proxy Target: {}", args.proxy_target);
        info!("Proxy Prefix: {}", args.proxy_prefix);
        info!("Base Path: {}", args.base_path);
    }
    info!("-------------------------");
}

async fn print(text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

async fn open_session(
    args: &Args,
    store: Arc<dyn ConversationStore>,
    conversation: Option<i64>
) -> Result<ChatSession, Box<dyn Error + Send + Sync>> {
    let mut session = ChatSession::new(initialize_chat_client(args)?, store);
    if let Some(id) = conversation {
        if !session.open(id).await? {
            return Err(format!("No conversation with id {}", id).into());
        }
    }
    Ok(session)
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    log_configuration(&args);

    let command = args.command.clone().unwrap_or(Command::Chat { conversation: None });

    match command {
        Command::Proxy => {
            Server::new(args)?.run().await?;
        }
        Command::Chat { conversation } => {
            let store = initialize_conversation_store(&args)?;
            let mut session = open_session(&args, store, conversation).await?;
            let stdin = BufReader::new(tokio::io::stdin());
            repl::run_repl(&mut session, stdin, tokio::io::stdout()).await?;
        }
        Command::Ask { conversation, text } => {
            let store = initialize_conversation_store(&args)?;
            let mut session = open_session(&args, store, conversation).await?;
            let reply = session.send(&text.join(" ")).await?;
            print(&format!("{}\n", reply.content)).await?;
            if reply.error {
                return Err("Completion failed".into());
            }
        }
        Command::List => {
            let conversations = initialize_conversation_store(&args)?.get_all().await?;
            let out: String = conversations.iter().map(repl::render_conversation_line).collect();
            print(&out).await?;
        }
        Command::Show { id } => {
            let conversation = initialize_conversation_store(&args)?
                .get_by_id(id).await?
                .ok_or_else(|| format!("No conversation with id {}", id))?;
            let mut out = format!("# {}\n", conversation.title);
            for msg in &conversation.messages {
                let speaker = if msg.is_error() { "error" } else { msg.role.as_str() };
                out.push_str(&format!("[{}] {}\n", speaker, msg.content));
            }
            print(&out).await?;
        }
        Command::Rename { id, title } => {
            let title = title.join(" ");
            if title.trim().is_empty() {
                return Err("Title cannot be empty".into());
            }
            let store = initialize_conversation_store(&args)?;
            if store.update(id, ConversationPatch::title(title.trim())).await? == 0 {
                return Err(format!("No conversation with id {}", id).into());
            }
            info!("Renamed conversation {}", id);
        }
        Command::Delete { id } => {
            initialize_conversation_store(&args)?.remove(id).await?;
            info!("Deleted conversation {}", id);
        }
        Command::Clear => {
            initialize_conversation_store(&args)?.clear_all().await?;
            info!("Deleted all conversations");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn llm_config_reads_flags() {
        let args = Args::parse_from([
            "chat-llm",
            "--chat-llm-type",
            "node",
            "--chat-base-url",
            "http://localhost:5173/cxyz/chat-llm-node",
            "--chat-fallback",
        ]);
        let config = llm_config_from_args(&args).unwrap();
        assert_eq!(config.llm_type, llm::LlmType::Node);
        assert_eq!(config.api_key, None);
        assert!(config.fallback);
    }

    #[tokio::test]
    async fn ask_with_local_mock_saves_a_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        let db = db.to_str().unwrap();

        let args = Args::parse_from([
            "chat-llm",
            "ask",
            "--history-db-path",
            db,
            "--chat-llm-type",
            "local-mock",
            "what",
            "is",
            "rust",
        ]);
        run(args).await.unwrap();

        let list = Args::parse_from(["chat-llm", "list", "--history-db-path", db]);
        let store = initialize_conversation_store(&list).unwrap();
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "what is rust");
        assert_eq!(all[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn proxy_errors_are_returned() {
        let args = Args::parse_from(["chat-llm", "proxy", "--proxy-target", "nonsense"]);
        assert!(run(args).await.is_err());
    }

    #[tokio::test]
    async fn rename_of_missing_conversation_fails() {
        let args = Args::parse_from(["chat-llm", "rename", "42", "x", "--history-type", "memory"]);
        assert!(run(args).await.is_err());
    }
}
