use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use rusqlite::{ params, Connection, OptionalExtension };
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, Conversation, ConversationPatch };

/// Local conversation table in a SQLite file.
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened conversation database at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, Box<dyn Error + Send + Sync>> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, Box<dyn Error + Send + Sync>> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                messages TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_title ON conversations(title);"
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, Box<dyn Error + Send + Sync>>
        where
            T: Send + 'static,
            F: FnOnce(&Connection) -> Result<T, Box<dyn Error + Send + Sync>> + Send + 'static
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        }).await?
    }
}

fn row_to_conversation(
    id: i64,
    title: String,
    messages: String
) -> Result<Conversation, Box<dyn Error + Send + Sync>> {
    let messages: Vec<ChatMessage> = serde_json::from_str(&messages)?;
    Ok(Conversation { id: Some(id), title, messages })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get_all(&self) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, messages FROM conversations ORDER BY id"
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?;

            let mut conversations = Vec::new();
            for row in rows {
                let (id, title, messages) = row?;
                conversations.push(row_to_conversation(id, title, messages)?);
            }
            Ok(conversations)
        }).await
    }

    async fn add(&self, conversation: Conversation) -> Result<i64, Box<dyn Error + Send + Sync>> {
        let messages = serde_json::to_string(&conversation.messages)?;
        self.with_conn(move |conn| {
            match conversation.id {
                Some(id) => {
                    conn.execute(
                        "INSERT INTO conversations (id, title, messages) VALUES (?1, ?2, ?3)",
                        params![id, conversation.title, messages]
                    )?;
                    Ok(id)
                }
                None => {
                    conn.execute(
                        "INSERT INTO conversations (title, messages) VALUES (?1, ?2)",
                        params![conversation.title, messages]
                    )?;
                    Ok(conn.last_insert_rowid())
                }
            }
        }).await
    }

    async fn update(
        &self,
        id: i64,
        patch: ConversationPatch
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let messages = patch.messages.as_ref().map(serde_json::to_string).transpose()?;
        let title = patch.title;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET title = COALESCE(?1, title), messages = COALESCE(?2, messages)
                 WHERE id = ?3",
                params![title, messages, id]
            )?;
            Ok(changed)
        }).await
    }

    async fn remove(&self, id: i64) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(())
        }).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>, Box<dyn Error + Send + Sync>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT title, messages FROM conversations WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                )
                .optional()?;

            match row {
                Some((title, messages)) => Ok(Some(row_to_conversation(id, title, messages)?)),
                None => Ok(None),
            }
        }).await
    }

    async fn clear_all(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM conversations", [])?;
            Ok(())
        }).await
    }
}
