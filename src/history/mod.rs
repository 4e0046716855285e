mod memory;
mod redis;
mod sqlite;

pub use self::memory::MemoryConversationStore;
pub use self::redis::RedisConversationStore;
pub use self::sqlite::SqliteConversationStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::llm::chat::CompletionMessage;
use crate::models::chat::{ Conversation, ConversationPatch };

/// A single table of conversation records keyed by an auto-incrementing id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Every stored conversation, ordered by id.
    async fn get_all(&self) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>>;

    /// Inserts a record and returns its id. A record without an id gets the
    /// next generated one; an explicit id that already exists is an error.
    async fn add(&self, conversation: Conversation) -> Result<i64, Box<dyn Error + Send + Sync>>;

    /// Applies a partial update. Returns the number of records changed (0 or 1).
    async fn update(
        &self,
        id: i64,
        patch: ConversationPatch
    ) -> Result<usize, Box<dyn Error + Send + Sync>>;

    async fn remove(&self, id: i64) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>, Box<dyn Error + Send + Sync>>;

    /// Drops every record. Generated ids keep counting from where they were.
    async fn clear_all(&self) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub fn create_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryConversationStore::new())),
        "sqlite" => {
            let store = SqliteConversationStore::open(&args.history_db_path)?;
            Ok(Arc::new(store))
        }
        "redis" => {
            let store = RedisConversationStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "sqlite" => info!("Conversations will be stored in: sqlite at {}", args.history_db_path),
        "redis" => info!("Conversations will be stored in: redis at {}", args.history_host),
        other => info!("Conversations will be stored in: {}", other),
    }
    create_conversation_store(args)
}

/// The role/content pairs sent to a completion endpoint. Messages flagged as
/// errors are local notices and are left out.
pub fn to_completion_messages(conversation: &Conversation) -> Vec<CompletionMessage> {
    conversation.messages
        .iter()
        .filter(|msg| !msg.is_error())
        .map(|msg| CompletionMessage::new(msg.role.as_str(), msg.content.clone()))
        .collect()
}
