use async_trait::async_trait;
use std::collections::BTreeMap;
use std::error::Error;
use tokio::sync::RwLock;
use crate::history::ConversationStore;
use crate::models::chat::{ Conversation, ConversationPatch };

#[derive(Default)]
struct Table {
    rows: BTreeMap<i64, Conversation>,
    next_id: i64,
    /// Set once `i64::MAX` has been handed out.
    exhausted: bool,
}

/// In-process table. Nothing survives the process.
#[derive(Default)]
pub struct MemoryConversationStore {
    table: RwLock<Table>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table { rows: BTreeMap::new(), next_id: 1, exhausted: false }),
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_all(&self) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>> {
        let table = self.table.read().await;
        Ok(table.rows.values().cloned().collect())
    }

    async fn add(&self, mut conversation: Conversation) -> Result<i64, Box<dyn Error + Send + Sync>> {
        let mut table = self.table.write().await;
        let id = match conversation.id {
            Some(id) => {
                if table.rows.contains_key(&id) {
                    return Err(format!("Conversation {} already exists", id).into());
                }
                id
            }
            None if table.exhausted => {
                return Err("Conversation id space exhausted".into());
            }
            None => table.next_id.max(1),
        };
        match id.checked_add(1) {
            Some(after) => {
                table.next_id = table.next_id.max(after);
            }
            None => {
                table.exhausted = true;
            }
        }
        conversation.id = Some(id);
        table.rows.insert(id, conversation);
        Ok(id)
    }

    async fn update(
        &self,
        id: i64,
        patch: ConversationPatch
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(conversation) => {
                patch.apply(conversation);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn remove(&self, id: i64) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.table.write().await.rows.remove(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>, Box<dyn Error + Send + Sync>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn clear_all(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.table.write().await.rows.clear();
        Ok(())
    }
}
